//! Per-guild message archive with incremental, resumable sync.

pub mod archive;
pub mod channel;
pub mod codec;
pub mod coordinator;
pub mod error;
pub mod message;
pub mod registry;
pub mod source;
pub mod store;

/// Bumped whenever the persisted shape of a channel log changes. Channels
/// stored with another version are dropped on load and synced again.
pub const FORMAT_VERSION: u32 = 4;

pub use archive::{ChannelRef, GuildArchive};
pub use channel::{ChannelLoader, ChannelLog, LoadScope, Progress};
pub use codec::ArchiveCodec;
pub use coordinator::{SyncCoordinator, SyncJob, SyncOutcome, SyncProgress};
pub use error::{ArchiveError, FetchError, FormatError};
pub use message::MessageRecord;
pub use registry::{SyncGuard, SyncRegistry, SyncTicket};
pub use source::{MessageSource, SerenitySource};
pub use store::{ArchiveStore, LoadOutcome, LoadRequest, LoadedArchive, StoreConfig};
