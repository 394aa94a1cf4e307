use cadena_persistence::config::DbConfig;
use cadena_persistence::pg::{build_pool, PgPool};
use once_cell::sync::Lazy;
use std::sync::Mutex;

pub static TEST_POOL: Lazy<Option<PgPool>> = Lazy::new(|| {
    if std::env::var("DATABASE_URL").is_err() {
        return None;
    }
    let cfg = DbConfig::from_env();
    match build_pool(&cfg.url, 1, 4) {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("no se pudo construir el pool de pruebas: {e}");
            None
        }
    }
});

// Las pruebas comparten una base: se serializan y arrancan con las tablas
// del motor vacías (los planes quedan, cada prueba siembra el suyo).
static DB_GUARD: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn with_pool<F, R>(f: F) -> Option<R>
    where F: FnOnce(&PgPool) -> R
{
    TEST_POOL.as_ref().map(|p| f(p))
}

pub fn with_clean_db<F, R>(f: F) -> Option<R>
    where F: FnOnce(&PgPool) -> R
{
    with_pool(|pool| {
        let _guard = DB_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        let mut conn = pool.get().expect("conn");
        use diesel::connection::SimpleConnection;
        conn.batch_execute("TRUNCATE deliveries, contributions, draw_sessions, memberships, savings_groups CASCADE;")
            .expect("truncate");
        f(pool)
    })
}
