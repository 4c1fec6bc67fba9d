//! pvbridged - WebSocket bridge for process variables
//!
//! See [`pvbridged::cli`] for usage.

fn main() -> anyhow::Result<()> {
    pvbridged::cli::main()
}
