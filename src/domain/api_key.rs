use secrecy::ExposeSecret;
use secrecy::Secret;

/// Marketing service API key, e.g. `0123456789abcdef-us19`.
///
/// The segment after the first hyphen names the data center ("shard") that
/// owns the account; every call made with this key must be routed there.
#[derive(Clone)]
pub struct ApiKey {
    secret: Secret<String>,
    data_center: String,
}

impl ApiKey {
    pub fn parse(key: Secret<String>) -> Result<Self, String> {
        let data_center = key
            .expose_secret()
            .trim()
            .split('-')
            .nth(1)
            .filter(|dc| !dc.is_empty())
            .ok_or("The API key has no data center suffix")?
            .to_string();
        Ok(Self {
            secret: key,
            data_center,
        })
    }

    pub fn data_center(&self) -> &str { &self.data_center }

    pub fn expose_secret(&self) -> &str { self.secret.expose_secret().trim() }
}

// never print the key itself
impl std::fmt::Debug for ApiKey {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ApiKey")
            .field("secret", &self.secret)
            .field("data_center", &self.data_center)
            .finish()
    }
}
