use crate::utils::cookies;

/// Per-cycle upstream session. Built fresh every cycle; the site rotates tokens per session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub cookie: String,
    pub csrf_token: String,
    pub token_fields: String,
    pub token_unlocked: String,
}

impl SessionContext {
    pub fn new(cookie: String) -> Self {
        Self {
            cookie,
            ..Self::default()
        }
    }

    /// Folds `Set-Cookie` header values into the cookie string; new values win.
    pub fn absorb_set_cookies<I, S>(&mut self, set_cookies: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let issued = cookies::from_set_cookie_headers(set_cookies);
        if !issued.is_empty() {
            self.cookie = cookies::merge(&self.cookie, &issued);
        }
    }

    /// Overwrites only the tokens that came back non-empty.
    pub fn refresh_tokens(&mut self, csrf_token: String, token_fields: String, token_unlocked: String) {
        if !csrf_token.is_empty() {
            self.csrf_token = csrf_token;
        }
        if !token_fields.is_empty() {
            self.token_fields = token_fields;
        }
        if !token_unlocked.is_empty() {
            self.token_unlocked = token_unlocked;
        }
    }
}
