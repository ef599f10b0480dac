//! Ingestion Service Module
//!
//! Handles the acquisition of the external card catalog and feeds it into the import queue.
//!
//! ## Workflow
//! 1. **Resolve**: Reads the bulk-data index to find the current snapshot.
//! 2. **Stream**: Downloads the snapshot (one large JSON array) and splits it element by
//!    element while it arrives.
//! 3. **Filter**: Normalizes each card and keeps those updated within the lookback window.
//! 4. **Publish**: Sends every accepted card to the `ImportQueue`; the batch writers take it
//!    from there.
//!
//! Runs are started by an external caller: `POST /import` (see `handlers`), usually issued by
//! the `trigger` subcommand from a weekly cron entry.

pub mod fetcher;
pub mod handlers;
pub mod json_stream;
pub mod runs;
pub mod trigger;
pub mod types;

pub use fetcher::{BulkFetcher, import_stream};
pub use runs::ImportRuns;
pub use types::*;
