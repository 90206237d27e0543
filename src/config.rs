use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct Config {
    pub db_path: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl Config {
    pub fn load() -> eyre::Result<Self> {
        Ok(envy::prefixed("COURIER_").from_env::<Self>()?)
    }

    pub fn db_path(&self) -> &str {
        self.db_path
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or("courier.db")
    }

    pub fn host(&self) -> &str {
        self.host
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or("127.0.0.1")
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8080)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            host: None,
            port: None,
        }
    }
}
