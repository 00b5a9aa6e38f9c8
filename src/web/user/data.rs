use serde::Deserialize;

pub const MIN_PASSWORD_LEN: usize = 8;

fn plausible_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoginData {
    pub csrf_token: String,
    pub username: String,
    pub password: String,
}

impl LoginData {
    pub fn validate(&self) -> bool {
        plausible_email(&self.username) && self.password.len() >= MIN_PASSWORD_LEN
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct SignupData {
    pub csrf_token: String,
    pub username: String,
    pub password: String,
}

impl SignupData {
    pub fn validate(&self) -> bool {
        plausible_email(&self.username) && self.password.len() >= MIN_PASSWORD_LEN
    }
}

/// JSON credentials for the session API.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiCredentials {
    pub username: String,
    pub password: String,
}

impl ApiCredentials {
    pub fn validate(&self) -> bool {
        plausible_email(&self.username) && self.password.len() >= MIN_PASSWORD_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login(username: &str, password: &str) -> LoginData {
        LoginData {
            csrf_token: String::new(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn accepts_email_and_long_enough_password() {
        assert!(login("user@example.com", "password1").validate());
    }

    #[test]
    fn rejects_short_password() {
        assert!(!login("user@example.com", "short").validate());
    }

    #[test]
    fn rejects_non_email_username() {
        assert!(!login("not-an-email", "password1").validate());
        assert!(!login("@example.com", "password1").validate());
        assert!(!login("user@nodot", "password1").validate());
    }
}
