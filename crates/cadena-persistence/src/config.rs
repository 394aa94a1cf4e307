//! Configuración de conexión vía variables de entorno.
//! Convención `DATABASE_URL` más parámetros opcionales del pool.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;

// El archivo .env se carga una sola vez, la primera vez que alguien lo pide.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv();
});

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl DbConfig {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").expect("DATABASE_URL no definido");
        let min_connections = env::var("DATABASE_MIN_CONNECTIONS").ok()
                                                                  .and_then(|v| v.parse().ok())
                                                                  .unwrap_or(2);
        let max_connections = env::var("DATABASE_MAX_CONNECTIONS").ok()
                                                                  .and_then(|v| v.parse().ok())
                                                                  .unwrap_or(16);
        Self { url, min_connections, max_connections }
    }
}

/// Carga temprana de .env para aplicaciones externas que lo necesiten.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
