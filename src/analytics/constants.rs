pub const LOGGER_NAME: &str = "@telemetry/analytics";

pub const CLIENT_ID_KEY: &str = "telemetry.client_id";
pub const SESSION_KEY: &str = "telemetry.session";

pub(crate) const DEFAULT_MAX_QUEUE_SIZE: usize = 100;
pub(crate) const DEFAULT_BATCH_SIZE: usize = 10;
pub(crate) const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_SESSION_TIMEOUT_MS: u64 = 30 * 60 * 1_000;
pub(crate) const DEFAULT_MAX_BATCH_RETRIES: u32 = 3;

pub(crate) const DEFAULT_MAX_EVENT_NAME_LENGTH: usize = 40;
pub(crate) const DEFAULT_MAX_PARAMS: usize = 25;
pub(crate) const DEFAULT_MAX_PARAM_KEY_LENGTH: usize = 40;
pub(crate) const DEFAULT_MAX_PARAM_VALUE_LENGTH: usize = 100;
