pub mod analysis;
pub mod chat;
pub mod checkpoint;
pub mod file;
pub mod flow;
pub mod payload;
pub mod session;

pub use analysis::{
    CitationQuery, CitationResult, DraftRequest, NoveltyAnalysis, PitfallRecord,
    ResearchCoachResponse, SessionAnalyses, SignificanceRecord,
};
pub use chat::{AlternativePath, ChatMessage, ConversationFlowItem, Role};
pub use checkpoint::{
    Checkpoint, CheckpointList, CoachReport, PathType, UseAlternativePathRequest, UsedPath,
    UsedPathResponse,
};
pub use file::FileItem;
pub use flow::FlowNode;
pub use payload::{AgentReply, ChatPayload};
pub use session::{
    ClientAgentContext, ClientAgentInternalScore, ClientProfile, NewSession, Session,
    SessionGuid, SessionOutcome,
};
