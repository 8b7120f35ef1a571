//! OAuth 1.0a request signing (HMAC-SHA1)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use rand::Rng;
use rand::distributions::Alphanumeric;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use time::OffsetDateTime;

type HmacSha1 = Hmac<Sha1>;

const NONCE_LEN: usize = 32;

/// Percent-encode per RFC 3986 (unreserved characters pass through)
pub fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Compute the OAuth 1.0a signature for a request
///
/// `params` must contain every oauth_* parameter except the signature,
/// plus any query or form-body parameters. JSON bodies are not signed.
pub fn sign(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let base_string = format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    );
    let signing_key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );

    // HMAC accepts keys of any length
    let mut mac = match HmacSha1::new_from_slice(signing_key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA1 accepts any key length"),
    };
    mac.update(base_string.as_bytes());
    STANDARD.encode(mac.finalize().into_bytes())
}

/// User-context credentials for the platform API
#[derive(Clone)]
pub struct OAuthCredentials {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub access_token: SecretString,
    pub access_token_secret: SecretString,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials").finish_non_exhaustive()
    }
}

impl OAuthCredentials {
    /// All four values present and non-empty
    pub fn is_complete(&self) -> bool {
        [
            &self.consumer_key,
            &self.consumer_secret,
            &self.access_token,
            &self.access_token_secret,
        ]
        .iter()
        .all(|s| !s.expose_secret().trim().is_empty())
    }
}

/// Produces `Authorization` headers for signed requests
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: OAuthCredentials,
}

impl RequestSigner {
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self { credentials }
    }

    pub fn credentials(&self) -> &OAuthCredentials {
        &self.credentials
    }

    /// Header value with a fresh nonce and the current timestamp
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        extra_params: &[(String, String)],
    ) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let timestamp = OffsetDateTime::now_utc().unix_timestamp().to_string();
        self.authorization_header_with(method, url, extra_params, &nonce, &timestamp)
    }

    /// Deterministic variant; query parameters in `url` are signed and
    /// stripped from the base URL
    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &str,
        extra_params: &[(String, String)],
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let (base_url, query) = split_url(url);

        let oauth_params: Vec<(String, String)> = vec![
            (
                "oauth_consumer_key".to_string(),
                self.credentials.consumer_key.expose_secret().to_string(),
            ),
            ("oauth_nonce".to_string(), nonce.to_string()),
            (
                "oauth_signature_method".to_string(),
                "HMAC-SHA1".to_string(),
            ),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
            (
                "oauth_token".to_string(),
                self.credentials.access_token.expose_secret().to_string(),
            ),
            ("oauth_version".to_string(), "1.0".to_string()),
        ];

        let mut signing_params = oauth_params.clone();
        signing_params.extend(query);
        signing_params.extend(extra_params.iter().cloned());

        let signature = sign(
            method,
            &base_url,
            &signing_params,
            self.credentials.consumer_secret.expose_secret(),
            self.credentials.access_token_secret.expose_secret(),
        );

        let mut header_params = oauth_params;
        header_params.push(("oauth_signature".to_string(), signature));
        header_params.sort();

        let fields = header_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect::<Vec<_>>()
            .join(", ");

        format!("OAuth {}", fields)
    }
}

/// Split a URL into its signing base (no query or fragment) and decoded
/// query pairs. Unparseable URLs are signed as given.
fn split_url(url: &str) -> (String, Vec<(String, String)>) {
    match Url::parse(url) {
        Ok(mut parsed) => {
            let query: Vec<(String, String)> = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            parsed.set_query(None);
            parsed.set_fragment(None);
            (parsed.to_string(), query)
        }
        Err(_) => (url.to_string(), Vec::new()),
    }
}
