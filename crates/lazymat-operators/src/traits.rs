//! Shared operator surface.
//!
//! Every operator is a free function that takes a [`Context`], one or two
//! upstream materializers and its parameters, and returns a new
//! [`Materializer`]. User closures are fallible: an `Err` fails the operator
//! (fail-fast, no retry) and is forwarded to every waiter.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use lazymat_core::prelude::*;

/// Element test used by filter and the first-match operators.
pub type PredicateFn<E> = Rc<dyn Fn(&E) -> Result<bool>>;

/// Element transform used by map and map-first-where.
pub type MapFn<E, F> = Rc<dyn Fn(E) -> Result<F>>;

/// Expansion used by flat-map.
pub type ExpandFn<E, F> = Rc<dyn Fn(E) -> Result<Materializer<F>>>;

/// Stable operator names, used as chassis labels in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Concat,
    Insert,
    Remove,
    Replace,
    Filter,
    Map,
    FlatMap,
    Source,
    Slice,
    Window,
    SymmetricDifference,
    MapFirstWhere,
    RemoveFirstWhere,
}

impl OperatorKind {
    /// Human-readable operator name (stable).
    pub fn name(self) -> &'static str {
        match self {
            OperatorKind::Concat => "concat",
            OperatorKind::Insert => "insert",
            OperatorKind::Remove => "remove",
            OperatorKind::Replace => "replace",
            OperatorKind::Filter => "filter",
            OperatorKind::Map => "map",
            OperatorKind::FlatMap => "flat_map",
            OperatorKind::Source => "source",
            OperatorKind::Slice => "slice",
            OperatorKind::Window => "window",
            OperatorKind::SymmetricDifference => "symmetric_difference",
            OperatorKind::MapFirstWhere => "map_first_where",
            OperatorKind::RemoveFirstWhere => "remove_first_where",
        }
    }
}

/// Size of `upstream` when reading it cannot walk down a chain of running
/// operators. Settled upstreams are asked; running ones are consulted once,
/// when the operator above them is built, and otherwise only through answers.
pub(crate) fn settled_size<E: Element>(upstream: &Materializer<E>) -> Option<usize> {
    if upstream.status().is_terminal() {
        upstream.known_size()
    } else {
        None
    }
}

/// Fields every operator state carries.
#[derive(Clone)]
pub(crate) struct OpBase<E: Element> {
    pub ctx: Context,
    pub chain: TaskId,
    pub holder: StateRef<E>,
}

impl<E: Element> OpBase<E> {
    pub fn new(ctx: &Context, holder: StateRef<E>) -> Self {
        Self {
            ctx: ctx.clone(),
            chain: TaskId::fresh(),
            holder,
        }
    }

    /// Chain the current continuation belongs to.
    pub fn chain(&self) -> TaskId {
        self.ctx.chain_id(self.chain)
    }

    /// Ask an upstream of `weight` a question. Upstreams heavier than the
    /// context's inline weight are asked from a scheduled task and answer
    /// back through another one, so stack depth stays bounded however deep
    /// the chain below is.
    fn hop<T: 'static>(
        &self,
        weight: Weight,
        callback: ValueCallback<T>,
        ask: impl FnOnce(ValueCallback<T>) + 'static,
    ) {
        if !self.ctx.defers(weight) {
            ask(callback);
            return;
        }
        let chain = self.chain();
        let callback = self.ctx.deferred(chain, callback);
        self.ctx.schedule(chain, weight, move || ask(callback));
    }

    pub fn element_of<U: Element>(
        &self,
        upstream: &Materializer<U>,
        index: usize,
        callback: IndexedCallback<U>,
    ) {
        let upstream = Rc::clone(upstream);
        self.hop(upstream.weight_element(), callback, move |callback| {
            upstream.materialize_element(index, callback)
        });
    }

    pub fn size_of<U: Element>(&self, upstream: &Materializer<U>, callback: ValueCallback<usize>) {
        let upstream = Rc::clone(upstream);
        self.hop(upstream.weight_size(), callback, move |callback| {
            upstream.materialize_size(callback)
        });
    }

    pub fn elements_of<U: Element>(
        &self,
        upstream: &Materializer<U>,
        callback: ValueCallback<Rc<Vec<U>>>,
    ) {
        let upstream = Rc::clone(upstream);
        self.hop(upstream.weight_elements(), callback, move |callback| {
            upstream.materialize_elements(callback)
        });
    }

    /// Fail the operator and return the error waiters should observe.
    pub fn fail(&self, error: Error) -> Error {
        let error = match self.ctx.token().cause() {
            Some(cause) => cause,
            None => error,
        };
        self.holder.fail(error.clone());
        error
    }
}
