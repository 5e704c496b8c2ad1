//! Small free-standing helpers with no better home. Kept deliberately thin:
//! generic collection/string lambda helpers and a scheduled-task runner used
//! to live here, but lost their last caller once the orchestrator's own
//! polling loop and the store's status-keyed queries covered the same
//! ground, and were removed rather than carried as dead weight.
