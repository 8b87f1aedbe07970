//! Trace identity and sampling.
//!
//! Ids come from the OpenTelemetry SDK's `RandomIdGenerator`; sampling uses
//! its `Sampler`, wrapped parent-based so children follow the root decision.

use opentelemetry::trace::{
    SamplingDecision, SpanContext, SpanId, SpanKind, TraceContextExt, TraceFlags, TraceId,
    TraceState,
};
use opentelemetry::Context;
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator, Sampler, ShouldSample};

/// Position of an observation inside a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_span_id: Option<SpanId>,
    pub sampled: bool,
}

impl TraceContext {
    /// This position as an OpenTelemetry span context, for propagation and
    /// parenting exported spans.
    pub fn span_context(&self) -> SpanContext {
        let flags = if self.sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        SpanContext::new(self.trace_id, self.span_id, flags, false, TraceState::default())
    }
}

/// Sampler for a probability: always on at 1 or more, always off at 0 or
/// less, trace-id ratio in between.
pub fn ratio_sampler(probability: f64) -> Sampler {
    if probability >= 1.0 {
        Sampler::AlwaysOn
    } else if probability <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(probability)
    }
}

/// Issues ids and sampling decisions for starting observations.
#[derive(Debug, Clone)]
pub struct TraceIdentity {
    ids: RandomIdGenerator,
    sampler: Sampler,
}

impl TraceIdentity {
    /// `root` decides for observations without a parent.
    pub fn new(root: Sampler) -> Self {
        Self {
            ids: RandomIdGenerator::default(),
            sampler: Sampler::ParentBased(Box::new(root)),
        }
    }

    pub fn sampler(&self) -> &Sampler {
        &self.sampler
    }

    pub(crate) fn start(&self, name: &str, parent: Option<&TraceContext>) -> TraceContext {
        let parent_cx = parent.map(|p| Context::new().with_remote_span_context(p.span_context()));
        let trace_id = match parent {
            Some(parent) => parent.trace_id,
            None => self.ids.new_trace_id(),
        };
        let decision = self
            .sampler
            .should_sample(parent_cx.as_ref(), trace_id, name, &SpanKind::Internal, &[], &[])
            .decision;

        TraceContext {
            trace_id,
            span_id: self.ids.new_span_id(),
            parent_span_id: parent.map(|p| p.span_id),
            sampled: decision == SamplingDecision::RecordAndSample,
        }
    }
}

impl Default for TraceIdentity {
    fn default() -> Self {
        Self::new(Sampler::AlwaysOn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_gets_fresh_valid_ids() {
        let identity = TraceIdentity::default();
        let a = identity.start("op", None);
        let b = identity.start("op", None);

        assert!(a.span_context().is_valid());
        assert!(a.sampled);
        assert!(a.parent_span_id.is_none());
        assert_ne!(a.trace_id, b.trace_id);
    }

    #[test]
    fn test_child_inherits_trace_and_sampling() {
        let sampled = TraceIdentity::new(Sampler::AlwaysOn).start("root", None);
        let dropped = TraceIdentity::new(Sampler::AlwaysOff).start("root", None);
        assert!(!dropped.sampled);

        // The child's own root sampler never applies once a parent exists.
        let identity = TraceIdentity::new(Sampler::AlwaysOff);
        let child = identity.start("child", Some(&sampled));
        assert_eq!(child.trace_id, sampled.trace_id);
        assert_eq!(child.parent_span_id, Some(sampled.span_id));
        assert_ne!(child.span_id, sampled.span_id);
        assert!(child.sampled);

        let identity = TraceIdentity::new(Sampler::AlwaysOn);
        assert!(!identity.start("child", Some(&dropped)).sampled);
    }

    #[test]
    fn test_ratio_sampler_bounds() {
        assert!(matches!(ratio_sampler(7.0), Sampler::AlwaysOn));
        assert!(matches!(ratio_sampler(0.0), Sampler::AlwaysOff));
        assert!(matches!(ratio_sampler(0.25), Sampler::TraceIdRatioBased(p) if p == 0.25));
    }

    #[test]
    fn test_span_context_carries_sampling_flag() {
        let identity = TraceIdentity::new(Sampler::AlwaysOff);
        let trace = identity.start("op", None);
        assert!(!trace.span_context().is_sampled());
        assert!(!trace.span_context().is_remote());
    }
}
