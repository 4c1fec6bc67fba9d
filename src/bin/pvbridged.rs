//! pvbridged - WebSocket bridge for process variables
//!
//! Installs the `pvbridged` binary from the root package. See
//! [`pvbridged::cli`] for usage.

fn main() -> anyhow::Result<()> {
    pvbridged::cli::main()
}
