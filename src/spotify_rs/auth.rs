use base64::Engine;
use base64::engine::general_purpose;
use rand::Rng;

/// Client id and secret of the registered Spotify application.
#[derive(Clone)]
pub struct SpotifyApiCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for SpotifyApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyApiCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

pub const DEFAULT_SCOPES: &str = "user-top-read user-read-private playlist-read-private playlist-modify-public playlist-modify-private";

/// Generate a random string for the OAuth `state` parameter
fn generate_random_string(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            const CHARSET: &[u8] =
                b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
            CHARSET[rng.random_range(0..CHARSET.len())] as char
        })
        .collect()
}

/// Generate a random state parameter for CSRF protection
pub fn generate_state() -> String {
    generate_random_string(16)
}

/// Build the URL the user visits to grant access.
pub fn authorize_url(
    accounts_base: &str,
    client_id: &str,
    redirect_uri: &str,
    state: &str,
    scope: &str,
) -> String {
    format!(
        "{}/authorize?client_id={}&response_type=code&redirect_uri={}&state={}&scope={}",
        accounts_base.trim_end_matches('/'),
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(state),
        urlencoding::encode(scope)
    )
}

/// `Authorization` header value for token endpoint requests.
pub fn basic_auth_header(credentials: &SpotifyApiCredentials) -> String {
    format!(
        "Basic {}",
        general_purpose::STANDARD.encode(format!(
            "{}:{}",
            credentials.client_id, credentials.client_secret
        ))
    )
}

pub fn client_credentials_form() -> Vec<(&'static str, String)> {
    vec![("grant_type", "client_credentials".to_string())]
}

pub fn refresh_token_form(refresh_token: &str) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.to_string()),
    ]
}

/// https://developer.spotify.com/documentation/web-api/tutorials/code-flow
pub fn authorization_code_form(code: &str, redirect_uri: &str) -> Vec<(&'static str, String)> {
    vec![
        ("grant_type", "authorization_code".to_string()),
        ("code", code.to_string()),
        ("redirect_uri", redirect_uri.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_state() {
        let state = generate_state();
        assert_eq!(state.len(), 16);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()
            || c == '-'
            || c == '.'
            || c == '_'
            || c == '~'));
    }

    #[test]
    fn test_authorize_url() {
        let url = authorize_url(
            "https://accounts.spotify.com/",
            "test_client_id",
            "http://localhost:3000/callback",
            "abc",
            "user-top-read",
        );

        assert!(url.starts_with("https://accounts.spotify.com/authorize?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        assert!(url.contains("scope=user-top-read"));
    }

    #[test]
    fn test_basic_auth_header() {
        let credentials = SpotifyApiCredentials {
            client_id: "id".into(),
            client_secret: "secret".into(),
        };
        // base64("id:secret")
        assert_eq!(basic_auth_header(&credentials), "Basic aWQ6c2VjcmV0");
    }

    #[test]
    fn test_refresh_form() {
        let form = refresh_token_form("r1");
        assert!(form.contains(&("grant_type", "refresh_token".to_string())));
        assert!(form.contains(&("refresh_token", "r1".to_string())));
    }
}
