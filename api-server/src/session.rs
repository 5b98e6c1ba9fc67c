// Cookie-derived session identity. The session layer proper lives outside
// this service; here a missing cookie just gets a fresh opaque id so the
// websocket registry and reservation holds have something to key on.
use axum::{
    extract::Request,
    http::header::{COOKIE, SET_COOKIE},
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Debug, Clone)]
pub struct Session(pub String);

pub async fn session_middleware(mut request: Request, next: Next) -> Response {
    let existing = request
        .headers()
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|header| parse_session_cookie(header, SESSION_COOKIE));

    let (session_id, issued) = match existing {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };
    debug!("request session {}", session_id);
    request.extensions_mut().insert(Session(session_id.clone()));

    let mut response = next.run(request).await;
    if issued {
        let cookie = format!("{SESSION_COOKIE}={session_id}; Max-Age=3600; Path=/; HttpOnly");
        if let Ok(value) = cookie.parse() {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

/// Pulls one cookie value out of a Cookie header.
pub fn parse_session_cookie(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_session_among_other_cookies() {
        let header = "theme=dark; session_id=abc-123; lang=en";
        assert_eq!(
            parse_session_cookie(header, SESSION_COOKIE),
            Some("abc-123".to_string())
        );
    }

    #[test]
    fn missing_or_empty_session_yields_none() {
        assert_eq!(parse_session_cookie("theme=dark", SESSION_COOKIE), None);
        assert_eq!(parse_session_cookie("session_id=", SESSION_COOKIE), None);
        assert_eq!(parse_session_cookie("", SESSION_COOKIE), None);
    }

    #[test]
    fn cookie_name_must_match_exactly() {
        assert_eq!(
            parse_session_cookie("xsession_id=abc", SESSION_COOKIE),
            None
        );
    }
}
