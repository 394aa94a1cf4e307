//! Constantes del motor.

/// Retardo del primer paso de la revelación animada.
pub const REVEAL_BASE_DELAY_MS: u32 = 800;

/// Incremento de retardo entre pasos consecutivos. Estrictamente positivo:
/// la secuencia de revelación exige retardos crecientes.
pub const REVEAL_STEP_DELAY_MS: u32 = 700;
