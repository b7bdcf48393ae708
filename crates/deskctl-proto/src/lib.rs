// deskctl-proto: wire layer for the desk-phone instrumentation protocol
// (TLS transport, framing, request correlation, payload decoding)

pub mod correlator;
pub mod decode;
pub mod definitions;
pub mod error;
pub mod frame;
pub mod reassembly;
pub mod structured;
pub mod tables;
pub mod transport;

pub use correlator::{AUTH_REQUEST_ID, Correlator, Dispatch, PendingReply};
pub use decode::{CallRecord, Decoded, Fragment, KeyRecord, LampRecord, ToneRecord};
pub use definitions::{
    DEFINITIONS_VERSION, EventCategory, MessageBuilder, OperaDefinitions, TiRequest,
};
pub use error::Error;
pub use frame::FrameSplitter;
pub use reassembly::{Progress, Reassembler};
pub use structured::{DisplayModel, DisplayObject, KeyModuleModel, KeyModuleObject};
pub use tables::{
    CallEvent, DeviceFamily, DeviceType, Hook, Key, KeyAction, KeyEventKind, LampColour,
    LampMode, ToneState,
};
pub use transport::{BoxedStream, Connector, DEFAULT_PORT, TlsConnector, TlsMode, TransportConfig};
