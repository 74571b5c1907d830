//! Custom tracing layers

use tracing::{Subscriber, span};
use tracing_subscriber::{
    layer::{Context, Layer},
    registry::LookupSpan,
};

use crate::context::{NodeContextData, NodeContextGuard};

/// Layer that attaches the active node context to new spans
///
/// Every span opened while a [`NodeContextGuard`] is alive carries a
/// [`NodeContextExtension`], so events emitted later from that span (for
/// example after the guard moved on to another node) still belong to the
/// node that opened it.
pub struct NodeContextLayer;

impl NodeContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NodeContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct NodeContextExtension {
    pub data: NodeContextData,
}

impl<S> Layer<S> for NodeContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        if let Some(data) = NodeContextGuard::current() {
            span.extensions_mut().insert(NodeContextExtension { data });
        } else if let Some(inherited) = span
            .parent()
            .and_then(|parent| parent.extensions().get::<NodeContextExtension>().cloned())
        {
            span.extensions_mut().insert(inherited);
        }
    }
}
