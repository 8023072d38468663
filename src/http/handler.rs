use crate::http::request::LogicalRequest;

/// Application code: receives the finalized request, returns the response body text.
pub type HandlerFunc = Box<dyn Fn(&LogicalRequest) -> String + Sync + Send>;
