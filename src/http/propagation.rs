//! W3C Trace Context propagation through the OpenTelemetry propagator.

use std::collections::HashMap;

use opentelemetry::propagation::TextMapPropagator;
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use opentelemetry_sdk::propagation::TraceContextPropagator;

use crate::observation::TraceContext;

/// Headers (`traceparent`, and `tracestate` when set) that carry `trace`
/// to the server.
pub fn trace_headers(trace: &TraceContext) -> HashMap<String, String> {
    let cx = Context::new().with_remote_span_context(trace.span_context());
    let mut headers = HashMap::new();
    TraceContextPropagator::new().inject_context(&cx, &mut headers);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{Sampler, TraceIdentity};

    #[test]
    fn test_traceparent_layout() {
        let trace = TraceIdentity::default().start("op", None);
        let headers = trace_headers(&trace);

        let expected = format!("00-{}-{}-01", trace.trace_id, trace.span_id);
        assert_eq!(headers.get("traceparent"), Some(&expected));
        assert_eq!(expected.len(), 55);
    }

    #[test]
    fn test_unsampled_flag() {
        let trace = TraceIdentity::new(Sampler::AlwaysOff).start("op", None);
        let headers = trace_headers(&trace);
        assert!(headers["traceparent"].ends_with("-00"));
    }

    #[test]
    fn test_extracts_back_to_same_span() {
        let trace = TraceIdentity::default().start("op", None);
        let headers = trace_headers(&trace);

        let cx = TraceContextPropagator::new().extract(&headers);
        let extracted = cx.span().span_context().clone();
        assert_eq!(extracted.trace_id(), trace.trace_id);
        assert_eq!(extracted.span_id(), trace.span_id);
        assert!(extracted.is_sampled());
    }
}
