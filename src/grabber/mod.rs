pub(crate) mod blocklist;
pub(crate) mod candidate;
pub(crate) mod engine;
pub(crate) mod enhance;
pub(crate) mod fetcher;
pub(crate) mod io;
pub(crate) mod orchestrator;
pub(crate) mod outcome;
pub(crate) mod retry;
pub(crate) mod sanitize;
pub(crate) mod site;
pub(crate) mod source;
pub(crate) mod summary;
