// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const WS_PATH: &str = "ws";
pub const STATS_PATH: &str = "stats";

// Per-connection outbound queue capacity. A connection whose queue
// overflows is force-disconnected instead of stalling fan-out.
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

// Inbound frames larger than this are dropped with a warning
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

// Presence colors, drawn uniformly at random at attach time
pub const PRESENCE_PALETTE: &[&str] = &[
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4",
    "#46f0f0", "#f032e6", "#bcf60c", "#fabebe", "#008080", "#e6beff",
];
