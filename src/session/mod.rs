//! Per-user engine sessions.
//!
//! Each user is mapped to one engine process, launched on first use and
//! reused afterwards. Every session listens on its own port.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   SessionRegistry                    │
//! │  ├─ sessions: HashMap<user_id, Arc<Session>>         │
//! │  ├─ creation_lock (serializes first-time launches)   │
//! │  └─ port_allocator: 6311, 6312, ... (never reused)   │
//! └──────────────────────────────────────────────────────┘
//!                            │ Connection
//!         ┌──────────────────┼──────────────────┐
//!         ▼                  ▼                  ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ user "a"     │   │ user "b"     │   │ user "n"     │
//! │ Port: 6311   │   │ Port: 6312   │   │ Port: ...    │
//! │ R + Rserve   │   │ R + Rserve   │   │ R + Rserve   │
//! └──────────────┘   └──────────────┘   └──────────────┘
//! ```

mod port_allocator;
mod registry;
mod types;

pub use port_allocator::PortAllocator;
pub use registry::{SessionRegistry, SessionStats};
pub use types::{Session, SessionConnection, SessionInfo, SessionStatus};
