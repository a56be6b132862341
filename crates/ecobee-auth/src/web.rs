//! Web login flow
//!
//! Accounts configured with a username and password authenticate through the
//! consumer portal instead of the PIN grant:
//! 1. `GET {web}/authorize` starts a login transaction and yields a `state`
//! 2. `POST {web}/u/login?state=..` submits the credentials; the response sets
//!    the `auth0` session cookie
//! 3. `GET {web}/authorize` again, presenting the cookie, returns an HTML form
//!    whose hidden inputs carry `access_token` and `expires_in`
//!
//! Step 3 alone (`exchange_session`) renews the access token while the session
//! cookie is still valid. The portal issues no refresh token.

use tracing::{debug, info};
use transport::{HttpRequest, HttpResponse, Transport};

use crate::constants::{
    ENDPOINT_AUTHORIZE, Endpoints, SESSION_COOKIE, WEB_AUDIENCE, WEB_CLIENT_ID, WEB_REDIRECT_URI,
    WEB_SCOPES,
};
use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// Outcome of a full username/password login.
#[derive(Debug, Clone)]
pub struct WebLogin {
    /// Value of the `auth0` cookie, reusable with `exchange_session`.
    pub session_token: String,
    pub tokens: TokenResponse,
}

fn authorize_request(endpoints: &Endpoints) -> HttpRequest {
    HttpRequest::get(endpoints.web_url(ENDPOINT_AUTHORIZE))
        .query("response_type", "token")
        .query("response_mode", "form_post")
        .query("client_id", WEB_CLIENT_ID)
        .query("redirect_uri", WEB_REDIRECT_URI)
        .query("audience", WEB_AUDIENCE)
        .query("scope", WEB_SCOPES)
}

/// Log in with username and password and obtain an access token.
pub async fn login(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    username: &str,
    password: &str,
) -> Result<WebLogin> {
    let start = send(transport, &authorize_request(endpoints), "start login").await?;
    let state = login_state(&start)
        .ok_or_else(|| Error::Login("authorize response carried no login state".into()))?;
    debug!("web login transaction started");

    let submit = HttpRequest::post(endpoints.web_url("u/login"))
        .query("state", state.as_str())
        .form(&[
            ("state", state.as_str()),
            ("username", username),
            ("password", password),
            ("action", "default"),
        ]);
    let response = send(transport, &submit, "submit credentials").await?;
    let session_token = response
        .cookie(SESSION_COOKIE)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Login(format!(
                "login rejected (status {}): no session cookie",
                response.status
            ))
        })?;

    let tokens = exchange_session(transport, endpoints, &session_token).await?;
    info!("web login completed");
    Ok(WebLogin {
        session_token,
        tokens,
    })
}

/// Exchange an existing session cookie for a fresh access token.
pub async fn exchange_session(
    transport: &dyn Transport,
    endpoints: &Endpoints,
    session_token: &str,
) -> Result<TokenResponse> {
    let request = authorize_request(endpoints)
        .header("Cookie", format!("{SESSION_COOKIE}={session_token}"));
    let response = send(transport, &request, "exchange session").await?;

    let access_token = hidden_input(&response.body, "access_token")
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Login("session rejected: no access_token in response".into()))?;
    let expires_in = hidden_input(&response.body, "expires_in").and_then(|v| v.parse().ok());

    Ok(TokenResponse {
        access_token,
        refresh_token: None,
        expires_in,
        token_type: Some("Bearer".into()),
        scope: None,
    })
}

async fn send(transport: &dyn Transport, request: &HttpRequest, action: &str) -> Result<HttpResponse> {
    let response = transport
        .send(request)
        .await
        .map_err(|e| Error::Http(format!("{action}: {e}")))?;
    // Redirects are part of the flow; anything 4xx/5xx is not.
    if response.status >= 400 {
        return Err(Error::Login(format!(
            "{action}: portal returned {}",
            response.status
        )));
    }
    Ok(response)
}

/// `state` from the redirect `Location`, falling back to a hidden form input.
fn login_state(response: &HttpResponse) -> Option<String> {
    response
        .header("location")
        .and_then(|location| query_param(location, "state"))
        .or_else(|| hidden_input(&response.body, "state"))
        .filter(|s| !s.is_empty())
}

fn query_param(url: &str, name: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

/// Value of `<input name="{name}" value="...">` located by substring search.
///
/// Attribute order within the tag does not matter.
pub fn hidden_input(html: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\"");
    let at = html.find(&marker)?;
    let tag_start = html[..at].rfind('<')?;
    let tag_end = at + html[at..].find('>')?;
    let tag = &html[tag_start..tag_end];

    let value_at = tag.find("value=\"")? + "value=\"".len();
    let len = tag[value_at..].find('"')?;
    Some(tag[value_at..value_at + len].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::{Body, ScriptedTransport, TransportError};

    fn endpoints() -> Endpoints {
        Endpoints::single_host("https://auth.test")
    }

    fn token_form(access_token: &str, expires_in: &str) -> String {
        format!(
            r#"<html><body><form method="post" action="https://www.ecobee.com/home/authCallback">
<input type="hidden" name="access_token" value="{access_token}"/>
<input type="hidden" name="token_type" value="Bearer"/>
<input type="hidden" name="expires_in" value="{expires_in}"/>
</form></body></html>"#
        )
    }

    #[test]
    fn hidden_input_reads_value_in_either_attribute_order() {
        let html = token_form("at-1", "3600");
        assert_eq!(hidden_input(&html, "access_token").as_deref(), Some("at-1"));
        assert_eq!(hidden_input(&html, "expires_in").as_deref(), Some("3600"));
        assert_eq!(hidden_input(&html, "missing"), None);

        let reversed = r#"<input value="abc" type="hidden" name="state">"#;
        assert_eq!(hidden_input(reversed, "state").as_deref(), Some("abc"));
    }

    #[test]
    fn state_prefers_location_header() {
        let response = HttpResponse::new(302, "")
            .with_header("Location", "/u/login?state=from-header&ui_locales=en");
        assert_eq!(login_state(&response).as_deref(), Some("from-header"));

        let page = HttpResponse::new(200, r#"<input type="hidden" name="state" value="from-page">"#);
        assert_eq!(login_state(&page).as_deref(), Some("from-page"));

        assert_eq!(login_state(&HttpResponse::new(200, "<html></html>")), None);
    }

    #[tokio::test]
    async fn full_login() {
        let transport = ScriptedTransport::new();
        transport
            .push(HttpResponse::new(302, "").with_header("location", "/u/login?state=S1"))
            .push(
                HttpResponse::new(302, "")
                    .with_header("set-cookie", "auth0=session-1; Path=/; HttpOnly")
                    .with_header("location", "/authorize/resume?state=S1"),
            )
            .push(HttpResponse::new(200, token_form("web-at", "3600")));

        let result = login(&transport, &endpoints(), "user@example.com", "pw")
            .await
            .unwrap();
        assert_eq!(result.session_token, "session-1");
        assert_eq!(result.tokens.access_token, "web-at");
        assert_eq!(result.tokens.expires_in, Some(3600));
        assert!(result.tokens.refresh_token.is_none());

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].query_value("client_id"), Some(WEB_CLIENT_ID));
        assert_eq!(requests[0].query_value("response_mode"), Some("form_post"));

        assert_eq!(requests[1].url, "https://auth.test/u/login");
        assert_eq!(requests[1].query_value("state"), Some("S1"));
        let Body::Form(fields) = &requests[1].body else {
            panic!("login must submit a form");
        };
        assert!(fields.contains(&("username".into(), "user@example.com".into())));
        assert!(fields.contains(&("password".into(), "pw".into())));

        assert_eq!(requests[2].header_value("cookie"), Some("auth0=session-1"));
    }

    #[tokio::test]
    async fn wrong_password_yields_login_error() {
        let transport = ScriptedTransport::new();
        transport
            .push(HttpResponse::new(302, "").with_header("location", "/u/login?state=S1"))
            .push(HttpResponse::new(400, "<html>Wrong email or password</html>"));

        let err = login(&transport, &endpoints(), "user@example.com", "bad")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Login(_)), "got: {err:?}");
        assert_eq!(transport.remaining(), 0);
    }

    #[tokio::test]
    async fn missing_cookie_yields_login_error() {
        let transport = ScriptedTransport::new();
        transport
            .push(HttpResponse::new(302, "").with_header("location", "/u/login?state=S1"))
            .push(HttpResponse::new(200, "<html>try again</html>"));

        let err = login(&transport, &endpoints(), "user@example.com", "pw")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Login(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn expired_session_yields_login_error() {
        let transport = ScriptedTransport::new();
        transport.push(HttpResponse::new(200, "<html>log in</html>"));

        let err = exchange_session(&transport, &endpoints(), "stale")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Login(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn transport_failure_is_http_error() {
        let transport = ScriptedTransport::new();
        transport.push_error(TransportError::Connect("refused".into()));

        let err = exchange_session(&transport, &endpoints(), "s")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err:?}");
    }
}
