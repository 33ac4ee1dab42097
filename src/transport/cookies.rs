//! Shared cookie storage plugged into the transport.
//!
//! A single jar is shared by every in-flight request. Cookies are scoped by
//! host only; `Domain` and `Path` attributes are not interpreted. A
//! `Max-Age` of zero or less, or an `Expires` date in the past, deletes the
//! cookie.

use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use url::Url;

#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

fn scope(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &Url, name: &str) -> Option<String> {
        let guard = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&scope(url))?.get(name).cloned()
    }

    pub fn insert(&self, url: &Url, name: &str, value: &str) {
        let mut guard = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(scope(url))
            .or_default()
            .insert(name.to_string(), value.to_string());
    }

    /// Append the jar's cookies for `url` to an explicit `Cookie` header.
    /// Pairs already named in `explicit` take precedence over the jar.
    pub fn merge_header(&self, url: &Url, explicit: &str) -> String {
        let explicit = explicit.trim().trim_end_matches(';').trim_end();
        let named: Vec<&str> = explicit
            .split(';')
            .filter_map(|pair| pair.split_once('=').map(|(name, _)| name.trim()))
            .collect();

        let guard = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        let mut pairs: Vec<String> = Vec::new();
        if !explicit.is_empty() {
            pairs.push(explicit.to_string());
        }
        if let Some(jar) = guard.get(&scope(url)) {
            pairs.extend(
                jar.iter()
                    .filter(|(name, _)| !named.contains(&name.as_str()))
                    .map(|(name, value)| format!("{name}={value}")),
            );
        }
        pairs.join("; ")
    }

    /// Drop a cookie for the host of `url`. Returns whether one was present.
    pub fn remove(&self, url: &Url, name: &str) -> bool {
        let mut guard = self.cookies.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .get_mut(&scope(url))
            .is_some_and(|jar| jar.remove(name).is_some())
    }
}

/// Parse a `Set-Cookie` value into name, value and whether it expires the cookie
fn parse_set_cookie(header: &str) -> Option<(String, String, bool)> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let expired = parts.any(|attr| {
        let Some((key, val)) = attr.trim().split_once('=') else {
            return false;
        };
        let (key, val) = (key.trim(), val.trim());
        if key.eq_ignore_ascii_case("max-age") {
            val.parse::<i64>().is_ok_and(|age| age <= 0)
        } else if key.eq_ignore_ascii_case("expires") {
            parse_cookie_date(val).is_some_and(|at| at <= Utc::now())
        } else {
            false
        }
    });

    Some((name.to_string(), value.trim().to_string(), expired))
}

/// `Expires` dates: RFC 1123 (`Thu, 01 Jan 1970 00:00:00 GMT`) or the
/// dashed Netscape form (`Thu, 01-Jan-1970 00:00:00 GMT`)
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|at| at.and_utc())
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        for header in cookie_headers {
            let Some((name, value, expired)) = header.to_str().ok().and_then(parse_set_cookie)
            else {
                continue;
            };
            if expired {
                self.remove(url, &name);
            } else {
                self.insert(url, &name, &value);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let guard = self.cookies.read().unwrap_or_else(PoisonError::into_inner);
        let jar = guard.get(&scope(url))?;
        if jar.is_empty() {
            return None;
        }
        let header = jar
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_set_cookies_and_header() {
        let jar = CookieJar::new();
        let u = url("https://chat.openai.com/backend-api/models");
        let headers = [
            HeaderValue::from_static("_cfuvid=abc; Path=/; HttpOnly"),
            HeaderValue::from_static("_puid=user-1; Secure"),
        ];
        jar.set_cookies(&mut headers.iter(), &u);

        assert_eq!(jar.get(&u, "_puid").as_deref(), Some("user-1"));
        let header = jar.cookies(&u).unwrap();
        assert_eq!(header.to_str().unwrap(), "_cfuvid=abc; _puid=user-1");
    }

    #[test]
    fn test_cookies_scoped_by_host() {
        let jar = CookieJar::new();
        jar.insert(&url("https://chat.openai.com/"), "a", "1");
        assert!(jar.cookies(&url("https://example.com/")).is_none());
        assert!(jar.cookies(&url("https://CHAT.openai.com/x")).is_some());
    }

    #[test]
    fn test_remove_strips_only_named_cookie() {
        let jar = CookieJar::new();
        let u = url("https://chat.openai.com/backend-api/conversation");
        jar.insert(&u, "_cfuvid", "track");
        jar.insert(&u, "__cf_bm", "bm");

        assert!(jar.remove(&u, "_cfuvid"));
        assert!(!jar.remove(&u, "_cfuvid"));
        assert_eq!(jar.cookies(&u).unwrap().to_str().unwrap(), "__cf_bm=bm");
    }

    #[test]
    fn test_max_age_zero_expires_cookie() {
        let jar = CookieJar::new();
        let u = url("https://chat.openai.com/");
        jar.insert(&u, "_puid", "old");
        let headers = [HeaderValue::from_static("_puid=; Max-Age=0")];
        jar.set_cookies(&mut headers.iter(), &u);
        assert!(jar.get(&u, "_puid").is_none());
    }

    #[test]
    fn test_past_expires_deletes_cookie() {
        let jar = CookieJar::new();
        let u = url("https://chat.openai.com/");
        jar.insert(&u, "__cf_bm", "old");
        jar.insert(&u, "cf_clearance", "old");
        let headers = [
            HeaderValue::from_static("__cf_bm=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT"),
            HeaderValue::from_static("cf_clearance=; Expires=Thu, 01-Jan-1970 00:00:01 GMT"),
        ];
        jar.set_cookies(&mut headers.iter(), &u);
        assert!(jar.get(&u, "__cf_bm").is_none());
        assert!(jar.get(&u, "cf_clearance").is_none());
    }

    #[test]
    fn test_future_expires_keeps_cookie() {
        let jar = CookieJar::new();
        let u = url("https://chat.openai.com/");
        let headers = [HeaderValue::from_static(
            "__cf_bm=fresh; Expires=Fri, 01 Jan 2100 00:00:00 GMT",
        )];
        jar.set_cookies(&mut headers.iter(), &u);
        assert_eq!(jar.get(&u, "__cf_bm").as_deref(), Some("fresh"));
    }

    #[test]
    fn test_merge_header_appends_jar_cookies() {
        let jar = CookieJar::new();
        let u = url("https://chat.openai.com/backend-api/models");
        jar.insert(&u, "__cf_bm", "bm");
        jar.insert(&u, "_puid", "from-jar");

        assert_eq!(jar.merge_header(&u, "_puid=p;"), "_puid=p; __cf_bm=bm");
        assert_eq!(
            jar.merge_header(&url("https://example.com/"), "_puid=p;"),
            "_puid=p"
        );
    }
}
