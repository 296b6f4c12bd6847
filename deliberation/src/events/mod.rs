//! Typed message bus for a deliberation
//!
//! Every artifact a participant produces travels through the bus as an
//! immutable, typed message. The append-only log behind the bus is the
//! only state shared between concurrently debated factors and the
//! progress relay.
//!
//! # Architecture
//!
//! 1. **Message Types** (`types.rs`): the six wire-stable kinds, their
//!    tagged payloads, and the participant roles allowed to publish them.
//!
//! 2. **Message Bus** (`bus.rs`): append-only log plus Tokio broadcast
//!    fan-out. Subscribers hold an offset cursor and refill from the log
//!    when they lag.
//!
//! 3. **Replay** (`replay.rs`): folds a log back into per-factor debates
//!    and the final `Deliberation`.
//!
//! # Message Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Participant  │────▶│ Message Bus  │────▶│ Subscribers  │
//! │  (publish)   │     │ (broadcast)  │     │ (cursor)     │
//! └──────────────┘     └──────┬───────┘     └──────▲───────┘
//!                             │                    │ lag refill
//!                             ▼                    │
//!                      ┌──────────────┐            │
//!                      │ Append-only  │────────────┘
//!                      │     log      │──▶ replay ──▶ Deliberation
//!                      └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use deliberation::events::{MessageBus, MessageDraft, MessageFilter, Payload, ParticipantRole};
//!
//! let bus = MessageBus::new().shared();
//! let mut sub = bus.subscribe(MessageFilter::new().factor(1).with_backfill());
//!
//! bus.publish(MessageDraft::new(ParticipantRole::Supporter, payload).for_factor(1))?;
//!
//! while let Some(message) = sub.recv().await {
//!     println!("{} #{}", message.kind(), message.id);
//! }
//! ```

pub mod bus;
pub mod replay;
pub mod types;

// Re-export core types
pub use bus::{BusError, BusResult, MessageBus, MessageFilter, SharedMessageBus, Subscription};
pub use replay::{project, DebateLedger, LogStats, ReplayError, ReplayResult};
pub use types::{
    CritiquePayload, Factor, FactorId, FactorListPayload, Message, MessageDraft, MessageId,
    MessageKind, ParticipantRole, Payload, RebuttalPayload, SupportPayload,
};
