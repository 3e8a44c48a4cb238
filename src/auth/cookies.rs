use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth::dto::JwtKeys;
use crate::auth::services::IssuedTokens;

pub const ACCESS_COOKIE: &str = "daypat_access";
pub const REFRESH_COOKIE: &str = "daypat_refresh";

/// Where credentials live on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScope {
    Persistent,
    Session,
}

impl CredentialScope {
    pub fn from_remember_me(remember_me: bool) -> Self {
        if remember_me {
            CredentialScope::Persistent
        } else {
            CredentialScope::Session
        }
    }
}

fn cookie(name: &'static str, value: String, max_age: Option<std::time::Duration>) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    if let Some(age) = max_age {
        builder = builder.max_age(time::Duration::seconds(age.as_secs() as i64));
    }
    builder.build()
}

/// Set the access and refresh cookies. A remembered login gets a `Max-Age`
/// so the cookies survive a browser restart; otherwise the browser drops them
/// when it closes.
pub fn write_session(jar: CookieJar, keys: &JwtKeys, tokens: &IssuedTokens) -> CookieJar {
    let scope = CredentialScope::from_remember_me(tokens.remember_me);
    let (access_age, refresh_age) = match scope {
        CredentialScope::Persistent => (Some(keys.access_ttl), Some(keys.refresh_ttl)),
        CredentialScope::Session => (None, None),
    };
    jar.add(cookie(ACCESS_COOKIE, tokens.access_token.clone(), access_age))
        .add(cookie(REFRESH_COOKIE, tokens.refresh_token.clone(), refresh_age))
}

pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::extract::FromRef;
    use uuid::Uuid;

    fn keys() -> JwtKeys {
        JwtKeys::from_ref(&AppState::fake())
    }

    #[tokio::test]
    async fn remembered_login_gets_persistent_cookies() {
        let keys = keys();
        let tokens = keys.issue(Uuid::new_v4(), true).unwrap();
        let jar = write_session(CookieJar::new(), &keys, &tokens);

        let refresh = jar.get(REFRESH_COOKIE).unwrap();
        assert_eq!(refresh.value(), tokens.refresh_token);
        assert_eq!(
            refresh.max_age(),
            Some(time::Duration::seconds(keys.refresh_ttl.as_secs() as i64))
        );
        assert_eq!(refresh.http_only(), Some(true));
    }

    #[tokio::test]
    async fn session_login_gets_session_cookies() {
        let keys = keys();
        let tokens = keys.issue(Uuid::new_v4(), false).unwrap();
        let jar = write_session(CookieJar::new(), &keys, &tokens);

        assert!(jar.get(ACCESS_COOKIE).unwrap().max_age().is_none());
        assert!(jar.get(REFRESH_COOKIE).unwrap().max_age().is_none());
    }

    #[tokio::test]
    async fn clearing_removes_both_cookies() {
        let keys = keys();
        let tokens = keys.issue(Uuid::new_v4(), true).unwrap();
        let jar = clear_session(write_session(CookieJar::new(), &keys, &tokens));
        assert!(jar.get(ACCESS_COOKIE).is_none());
        assert!(jar.get(REFRESH_COOKIE).is_none());
    }
}
