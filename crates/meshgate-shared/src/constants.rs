/// Base64 form of the single-byte placeholder PSK (`0x01`) used by public channels
pub const DEFAULT_CHANNEL_KEY: &str = "AQ==";

/// The 16-byte AES key the placeholder PSK expands to
pub const LEGACY_DEFAULT_KEY: &str = "1PG7OiApB1nwvP+rz05pAQ==";

/// Raw bytes of [`LEGACY_DEFAULT_KEY`]
pub const DEFAULT_PSK: [u8; 16] = [
    0xd4, 0xf1, 0xbb, 0x3a, 0x20, 0x29, 0x07, 0x59, 0xf0, 0xbc, 0xff, 0xab, 0xcf, 0x4e, 0x69, 0x01,
];

/// Maximum payload length of a mesh data packet. Envelopes larger than this are dropped.
pub const DATA_PAYLOAD_LEN: usize = 233;

/// AES-CTR nonce size in bytes (packet id || sender id, both little-endian u64)
pub const NONCE_SIZE: usize = 16;

/// Fixed-point scale of `latitude_i` / `longitude_i`
pub const COORDINATE_SCALE: f64 = 1e-7;

/// Firmware-version topic segment used by current mesh firmware
pub const DEFAULT_FIRMWARE_KEY: &str = "2";

/// Default forwarding radius for a client (80 km)
pub const DEFAULT_MAX_DISTANCE_METRES: f64 = 80_000.0;

/// Root of the topics bridged on the local broker
pub const ROUTER_TOPIC_ROOT: &str = "msh/router";

/// Number of leading topic segments (scope + firmware version) stripped before re-publishing
pub const REMOTE_TOPIC_PREFIX_SEGMENTS: usize = 2;

/// Default MQTT broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;
