mod session;
mod types;

pub use session::{
    AttachOptions, DebugSession, PauseNotice, RunOutcome, SessionSlot, new_session_slot,
};
pub use types::{
    BreakpointRecord, CallFrame, ConsoleEntry, FrameSummary, PauseSnapshot, PausedParams,
    PropertyDescriptor, PropertyView, RemoteObject, ResolvedLocation, ScopeDescriptor, ScopeView,
    SourceLocation, ensure_file_url, format_console_args, format_remote_value, resolve_frame_url,
    summarize_frame, summarize_property,
};
