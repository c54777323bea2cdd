pub mod credentials;
pub mod relay;
pub mod search;
pub mod tools;

// Re-export commonly used types for convenience
pub use credentials::{Credential, CredentialError, TokenProvider, TokenSource};

pub use relay::{
    MessageRewriter, RealtimeRelay, RelayError, Rewrite, SessionSettings, SessionState,
    ToolCallTracker, UpstreamTarget,
};

pub use search::{
    AzureSearchBackend, AzureSearchConfig, ListingRecord, SearchAdapter, SearchBackend,
    SearchError,
};

pub use tools::{
    Tool, ToolError, ToolHandler, ToolRegistry, ToolResult, ToolResultDirection, ToolSchema,
    builtin_registry,
};
