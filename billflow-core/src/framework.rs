use sqlx::PgPool;

/// Pool-backed executor for the `Processor` query objects in [`crate::entities`].
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
