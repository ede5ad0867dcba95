//! Login protocol for Dark Sun Online servers: packet codec, reassembly,
//! session state machine, and the tokio client that drives it.

pub mod client;
pub mod controller;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod packet;
pub mod receive_buffer;
pub mod resolver;
pub mod session;

pub use client::{ClientConfig, ClientStatus, LauncherClient};
pub use controller::{LoginController, Notification, Update};
pub use credentials::{CredentialError, Credentials, MAX_FIELD_LEN};
pub use endpoint::{DEFAULT_PORT, EndpointError, ResolvedAddress, ServerEndpoint};
pub use error::{
    ConnectError, ProtocolError, ReceiveError, ResolveError, SendError, SessionError,
};
pub use packet::{InboundResponse, OutboundRequest};
pub use receive_buffer::{ReceiveBuffer, ReceiveConfig};
pub use resolver::{Resolve, Resolver, StaticResolver, SystemResolver};
pub use session::{
    Command, LaunchTicket, Outcome, Session, SessionEvent, SessionHandle, SessionNotice,
    SessionState, Step,
};
