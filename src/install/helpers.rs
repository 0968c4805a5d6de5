//! Helper scripts installed under `<root>/included/` for script modules to source.

pub const LOG_SH: &str = r#"#!/bin/sh
# Logging helpers for plugkit script modules.
# Usage: . "$PLUGKIT_LOG"

log_info() {
    printf '[INFO] %s\n' "$*" >&2
}

log_warn() {
    printf '[WARN] %s\n' "$*" >&2
}

log_error() {
    printf '[ERROR] %s\n' "$*" >&2
}
"#;

pub const CORE_SH: &str = r#"#!/bin/sh
# Core helpers for plugkit script modules.
# Usage: . "$PLUGKIT_CORE"

# Print the device identifier of the current project, if any.
device_id() {
    printf '%s\n' "${PLUGKIT_DEVICE_ID:-}"
}

# Fail unless the current project has a device identifier.
require_device() {
    if [ -z "${PLUGKIT_DEVICE_ID:-}" ]; then
        printf 'No device configured for this project\n' >&2
        return 1
    fi
}

# Path of an installed binary.
binary_path() {
    printf '%s/binaries/%s\n' "$PLUGKIT_ROOT" "$1"
}
"#;
