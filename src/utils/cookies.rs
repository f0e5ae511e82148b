//! Cookie header handling for the upstream session.
//!
//! The session cookie travels as a single `Cookie` header value (`k=v; k2=v2`).
//! Keys are case-sensitive, later values replace earlier ones in place, and
//! segments without `=` or with an empty key are dropped.

/// Parses a `k=v; k2=v2` string into ordered pairs.
pub fn parse(cookie: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for segment in cookie.split(';') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim().to_string();
        match pairs.iter_mut().find(|(existing, _)| existing == key) {
            Some(pair) => pair.1 = value,
            None => pairs.push((key.to_string(), value)),
        }
    }
    pairs
}

pub fn serialize(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Merges `incoming` into `existing`; incoming values win on key collision.
pub fn merge(existing: &str, incoming: &str) -> String {
    let mut pairs = parse(existing);
    for (key, value) in parse(incoming) {
        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(pair) => pair.1 = value,
            None => pairs.push((key, value)),
        }
    }
    serialize(&pairs)
}

/// Reduces raw `Set-Cookie` values to one cookie string, keeping the `name=value`
/// part before the first `;` of each.
pub fn from_set_cookie_headers<I, S>(headers: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = headers
        .into_iter()
        .filter_map(|header| {
            let head = header.as_ref().split(';').next()?.trim();
            if head.is_empty() { None } else { Some(head.to_string()) }
        })
        .collect::<Vec<_>>()
        .join("; ");
    serialize(&parse(&joined))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_later_occurrence_wins() {
        let pairs = parse("a=1; b=2; a=3");
        assert_eq!(
            pairs,
            vec![("a".to_string(), "3".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_parse_drops_malformed_segments() {
        let pairs = parse("novalue; =orphan; ok=1;  ; x=");
        assert_eq!(
            pairs,
            vec![("ok".to_string(), "1".to_string()), ("x".to_string(), String::new())]
        );
    }

    #[test]
    fn test_keys_are_case_sensitive() {
        assert_eq!(merge("Sid=1", "sid=2"), "Sid=1; sid=2");
    }

    #[test]
    fn test_merge_new_values_win() {
        assert_eq!(merge("CAKEPHP=old; lang=ja", "CAKEPHP=new; csrfToken=t"), "CAKEPHP=new; lang=ja; csrfToken=t");
    }

    #[test]
    fn test_merge_into_empty() {
        assert_eq!(merge("", "a=1"), "a=1");
        assert_eq!(merge("a=1", ""), "a=1");
    }

    #[test]
    fn test_set_cookie_headers_strip_attributes() {
        let cookie = from_set_cookie_headers([
            "CAKEPHP=abc123; path=/; HttpOnly",
            "csrfToken=xyz; path=/; SameSite=Lax",
            "; Secure",
        ]);
        assert_eq!(cookie, "CAKEPHP=abc123; csrfToken=xyz");
    }

    #[test]
    fn test_set_cookie_value_may_contain_equals() {
        assert_eq!(from_set_cookie_headers(["t=a=b==; path=/"]), "t=a=b==");
    }
}
