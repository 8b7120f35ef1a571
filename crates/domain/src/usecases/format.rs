//! Formatting use case - renders a post into platform text within the character budget

use crate::model::{Post, SourceKind};

/// Configuration for the formatter
#[derive(Debug, Clone)]
pub struct FormatConfig {
    /// Platform character budget, counted in Unicode scalar values
    pub max_chars: usize,
    /// Hashtag appended to every post
    pub fixed_hashtag: String,
    /// Category label used when a post has none
    pub default_category: String,
    /// Maximum category hashtags before the fixed one
    pub max_category_tags: usize,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            max_chars: 280,
            fixed_hashtag: "#ChinaEV".to_string(),
            default_category: "EV News".to_string(),
            max_category_tags: 3,
        }
    }
}

/// Everything the formatter reads from a post
#[derive(Debug, Clone, Copy)]
pub struct FormatInput<'a> {
    pub title: Option<&'a str>,
    pub summary: &'a str,
    pub categories: &'a [String],
    pub source: SourceKind,
    pub link: &'a str,
}

impl<'a> From<&'a Post> for FormatInput<'a> {
    fn from(post: &'a Post) -> Self {
        Self {
            title: post.title.as_deref(),
            summary: &post.summary,
            categories: &post.categories,
            source: post.source,
            link: &post.source_url,
        }
    }
}

const DEFAULT_EMOJI: &str = "📰";
const ELLIPSIS: char = '…';

const CATEGORY_EMOJI: &[(&str, &str)] = &[
    ("BYD", "🚗"),
    ("NIO", "🚗"),
    ("XPeng", "🚗"),
    ("Li Auto", "🚗"),
    ("Zeekr", "🚗"),
    ("Xiaomi", "🚗"),
    ("Leapmotor", "🚗"),
    ("Sales", "📈"),
    ("Technology", "🔬"),
    ("Policy", "🏛"),
    ("Charging", "🔌"),
    ("Battery", "🔋"),
    ("Autonomous", "🤖"),
    ("Export", "🚢"),
];

/// Exact-match lookup, falling back to a generic icon
pub fn category_emoji(category: &str) -> &'static str {
    CATEGORY_EMOJI
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, emoji)| *emoji)
        .unwrap_or(DEFAULT_EMOJI)
}

/// Strip everything but letters and digits; `None` if nothing remains
pub fn sanitize_hashtag(category: &str) -> Option<String> {
    let cleaned: String = category.chars().filter(|c| c.is_alphanumeric()).collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(format!("#{}", cleaned))
    }
}

/// Pure renderer for outgoing post text
#[derive(Debug, Clone, Default)]
pub struct ContentFormatter {
    config: FormatConfig,
}

impl ContentFormatter {
    pub fn new(config: FormatConfig) -> Self {
        Self { config }
    }

    pub fn max_chars(&self) -> usize {
        self.config.max_chars
    }

    /// Render the final text. Only the summary is ever truncated; when the
    /// fixed parts alone do not fit, category hashtags and then the title
    /// are dropped whole.
    pub fn render(&self, input: FormatInput<'_>) -> String {
        let category = input
            .categories
            .iter()
            .map(|c| c.trim())
            .find(|c| !c.is_empty())
            .unwrap_or(self.config.default_category.as_str());
        let emoji = category_emoji(category);

        let summary = input.summary.trim();
        let title = input.title.map(str::trim).filter(|t| !t.is_empty());
        let with_title = match title {
            Some(title) => format!("{} {} | {} — ", emoji, category, title),
            None => format!("{} {} | ", emoji, category),
        };
        let without_title = format!("{} {} | ", emoji, category);

        let all_tags = self.hashtags(input.categories);
        let fixed_tag = self.config.fixed_hashtag.clone();

        let layouts = [
            (&with_title, self.suffix(&all_tags, input.source, input.link)),
            (&with_title, self.suffix(&fixed_tag, input.source, input.link)),
            (&without_title, self.suffix(&fixed_tag, input.source, input.link)),
            (&without_title, self.link_suffix(input.link)),
        ];

        for (prefix, suffix) in &layouts {
            if let Some(text) = self.fit(prefix, summary, suffix) {
                return text;
            }
        }

        // Only reachable when the link leaves no room for the header. A link
        // is never cut: it goes out alone if it fits, otherwise it is dropped.
        let link_len = input.link.chars().count();
        tracing::warn!(
            link_len,
            max_chars = self.config.max_chars,
            "Link exceeds character budget"
        );
        if !input.link.is_empty() && link_len <= self.config.max_chars {
            return input.link.to_string();
        }
        self.fit(&without_title, summary, "")
            .unwrap_or_else(|| truncate_with_ellipsis(summary, self.config.max_chars))
    }

    /// Render straight from a stored post
    pub fn render_post(&self, post: &Post) -> String {
        self.render(FormatInput::from(post))
    }

    fn hashtags(&self, categories: &[String]) -> String {
        let mut tags: Vec<String> = Vec::new();
        for tag in categories.iter().filter_map(|c| sanitize_hashtag(c)) {
            if tags.len() >= self.config.max_category_tags {
                break;
            }
            if !tags.contains(&tag) && !tag.eq_ignore_ascii_case(&self.config.fixed_hashtag) {
                tags.push(tag);
            }
        }
        tags.push(self.config.fixed_hashtag.clone());
        tags.join(" ")
    }

    fn suffix(&self, hashtags: &str, source: SourceKind, link: &str) -> String {
        let mut suffix = format!("\n\n{}\nSource: {}", hashtags, source.label());
        if !link.is_empty() {
            suffix.push('\n');
            suffix.push_str(link);
        }
        suffix
    }

    fn link_suffix(&self, link: &str) -> String {
        if link.is_empty() {
            String::new()
        } else {
            format!("\n{}", link)
        }
    }

    /// Assemble prefix + summary + suffix, truncating the summary to the
    /// space the fixed parts leave. `None` if the fixed parts do not fit.
    fn fit(&self, prefix: &str, summary: &str, suffix: &str) -> Option<String> {
        let fixed = prefix.chars().count() + suffix.chars().count();
        let available = self.config.max_chars.checked_sub(fixed)?;

        let body = truncate_with_ellipsis(summary, available);
        if body.is_empty() {
            // No summary text: drop the separator that would precede it
            let header = prefix.trim_end_matches(" — ").trim_end_matches(" | ");
            return Some(format!("{}{}", header, suffix));
        }
        Some(format!("{}{}{}", prefix, body, suffix))
    }
}

/// Truncate to at most `max` chars, ending in an ellipsis when shortened
fn truncate_with_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }

    let mut cut: String = text.chars().take(max - 1).collect();
    let trimmed_len = cut.trim_end().len();
    cut.truncate(trimmed_len);
    cut.push(ELLIPSIS);
    cut
}
