use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub base_url: String,
    pub jwt_private_key: SecretString,
    pub access_token_ttl: u64,
    pub refresh_token_ttl: u64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            jwt_private_key: SecretString::default(),
            access_token_ttl: 3600,
            refresh_token_ttl: 604_800,
        }
    }

    pub fn set_jwt_private_key(&mut self, key: SecretString) {
        self.jwt_private_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let args = GlobalArgs::new("http://localhost:8080".to_string());
        assert_eq!(args.base_url, "http://localhost:8080");
        assert_eq!(args.jwt_private_key.expose_secret(), "");
        assert_eq!(args.access_token_ttl, 3600);
        assert_eq!(args.refresh_token_ttl, 604_800);
    }
}
