//! The linked middleware chain.
//!
//! A chain is a singly linked list of [`Node`]s, each holding one handler and
//! the rest of the list. The list always ends in a sentinel whose handler
//! does nothing, so a continuation is safe to run even past the last real
//! handler.
//!
//! The chain is never patched: every registration rebuilds it from the full
//! handler list with [`build`], and the pipeline swaps the new head in.

use std::sync::Arc;

use crate::handler::{BoxedHandler, Noop};
use crate::request::Request;
use crate::writer::ResponseWriter;

pub(crate) struct Node {
    handler: BoxedHandler,
    next: Option<Box<Node>>,
}

impl Node {
    pub(crate) fn sentinel() -> Self {
        Self { handler: Arc::new(Noop), next: None }
    }

    /// Runs this node's handler with the remainder of the chain as its
    /// continuation.
    pub(crate) fn serve(&self, w: &mut dyn ResponseWriter, req: &Request) {
        self.handler.handle(w, req, Next { node: self.next.as_deref() });
    }
}

/// Builds the chain for `handlers`, in order.
///
/// Node *i*'s continuation serves node *i + 1*; the last real node continues
/// into the sentinel.
pub(crate) fn build(handlers: &[BoxedHandler]) -> Node {
    match handlers {
        [] => Node::sentinel(),
        [only] => Node {
            handler: Arc::clone(only),
            next: Some(Box::new(Node::sentinel())),
        },
        [first, rest @ ..] => Node {
            handler: Arc::clone(first),
            next: Some(Box::new(build(rest))),
        },
    }
}

/// The rest of the chain, handed to every [`Handler`](crate::Handler).
///
/// Running it consumes it, so a handler continues at most once.
pub struct Next<'a> {
    node: Option<&'a Node>,
}

impl Next<'_> {
    /// A continuation with nothing behind it. Useful for driving a single
    /// handler outside a pipeline.
    pub fn end() -> Self {
        Next { node: None }
    }

    pub fn run(self, w: &mut dyn ResponseWriter, req: &Request) {
        if let Some(node) = self.node {
            node.serve(w, req);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::StatusCode;

    use super::*;
    use crate::response::BufferedResponse;

    fn request() -> Request {
        Request::from(http::Request::get("/").body(bytes::Bytes::new()).unwrap())
    }

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> BoxedHandler {
        let log = Arc::clone(log);
        Arc::new(move |w: &mut dyn ResponseWriter, req: &Request, next: Next<'_>| {
            log.lock().unwrap().push(format!("{name}>"));
            next.run(w, req);
            log.lock().unwrap().push(format!("<{name}"));
        })
    }

    fn len(node: &Node) -> usize {
        match &node.next {
            Some(next) => 1 + len(next),
            None => 0,
        }
    }

    #[test]
    fn empty_chain_is_the_sentinel() {
        let chain = build(&[]);
        assert!(chain.next.is_none());

        let mut w = BufferedResponse::new();
        chain.serve(&mut w, &request());
        assert!(w.body().is_empty());
    }

    #[test]
    fn each_handler_gets_one_node_plus_sentinel() {
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 1..=4 {
            let handlers: Vec<_> = (0..n).map(|_| recording(&log, "h")).collect();
            assert_eq!(len(&build(&handlers)), n);
        }
    }

    #[test]
    fn runs_in_onion_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = build(&[recording(&log, "a"), recording(&log, "b"), recording(&log, "c")]);

        let mut w = BufferedResponse::new();
        chain.serve(&mut w, &request());

        assert_eq!(*log.lock().unwrap(), ["a>", "b>", "c>", "<c", "<b", "<a"]);
    }

    #[test]
    fn short_circuit_stops_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stop: BoxedHandler =
            Arc::new(|w: &mut dyn ResponseWriter, _req: &Request, _next: Next<'_>| {
                w.write_header(StatusCode::FORBIDDEN);
            });
        let chain = build(&[recording(&log, "a"), stop, recording(&log, "b")]);

        let mut w = BufferedResponse::new();
        chain.serve(&mut w, &request());

        assert_eq!(*log.lock().unwrap(), ["a>", "<a"]);
        assert_eq!(w.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn end_continuation_does_nothing() {
        let mut w = BufferedResponse::new();
        Next::end().run(&mut w, &request());
        assert!(w.body().is_empty());
    }
}
