//! Method name constants — every JSON-RPC method the endpoint accepts.

/// All caphub method names, grouped by namespace.
pub struct Methods;

impl Methods {
    // ── Lifecycle ───────────────────────────────────────────────────────
    pub const INITIALIZE: &str = "initialize";
    pub const PING: &str = "ping";
    pub const NOTIFICATIONS_INITIALIZED: &str = "notifications/initialized";

    // ── Tools ───────────────────────────────────────────────────────────
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";

    // ── Resources ───────────────────────────────────────────────────────
    pub const RESOURCES_LIST: &str = "resources/list";
    pub const RESOURCES_READ: &str = "resources/read";

    // ── Prompts ─────────────────────────────────────────────────────────
    pub const PROMPTS_LIST: &str = "prompts/list";
    pub const PROMPTS_GET: &str = "prompts/get";

    // ── Generation ──────────────────────────────────────────────────────
    pub const GENERATE: &str = "generate";

    // ── Session ─────────────────────────────────────────────────────────
    pub const SESSION_PROGRESS: &str = "session/progress";
    pub const SESSION_INFO: &str = "session/info";
}

/// Returns true if the given string is a method this server dispatches.
pub fn is_known_method(method: &str) -> bool {
    matches!(
        method,
        Methods::INITIALIZE
            | Methods::PING
            | Methods::NOTIFICATIONS_INITIALIZED
            | Methods::TOOLS_LIST
            | Methods::TOOLS_CALL
            | Methods::RESOURCES_LIST
            | Methods::RESOURCES_READ
            | Methods::PROMPTS_LIST
            | Methods::PROMPTS_GET
            | Methods::GENERATE
            | Methods::SESSION_PROGRESS
            | Methods::SESSION_INFO
    )
}
