//! The logical call handed to the dispatch entry point.

/// One logical RPC call: the method name and its request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcCall<Req> {
    pub method: String,
    pub request: Req,
}

impl<Req> RpcCall<Req> {
    pub fn new(method: impl Into<String>, request: Req) -> Self {
        Self {
            method: method.into(),
            request,
        }
    }
}
