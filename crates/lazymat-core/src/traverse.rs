//! Bounded traversal engine.
//!
//! Three drivers cover every derived operator:
//!
//! - [`next_while_by_element`] / [`prev_while_by_element`]: walk an index
//!   space one element query at a time. Answers that arrive synchronously are
//!   consumed in a loop; after `traversal_batch` inline steps the walk yields
//!   to the scheduler so a long traversal never grows the stack.
//! - [`next_while_segments`]: forward traversal stitched from consecutive
//!   upstream segments. Each segment is delegated to its source's own
//!   `materialize_next_while`; when a segment ends (its bound was reached or
//!   its source ran out) a planner decides the next segment, and the hand-off
//!   runs as a scheduled task on the traversal's chain.
//! - [`prev_while_segments`]: the backward counterpart over segments whose
//!   bounds are all known up front.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::callback::{Indexed, IndexedCallback, IndexedPredicate, ValueCallback};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::id::TaskId;
use crate::index::UNBOUNDED;
use crate::materializer::{Element, Materializer};
use crate::weight::Weight;

/// Element lookup in some index space.
pub type Fetch<E> = Rc<dyn Fn(usize, IndexedCallback<E>)>;

/// Element lookup backed by a materializer.
pub fn fetch_from<E: Element>(source: Materializer<E>) -> Fetch<E> {
    Rc::new(move |index, callback| source.materialize_element(index, callback))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Ascending,
    Descending { size: usize },
}

struct ElementLoop<E: Element> {
    ctx: Context,
    chain: TaskId,
    fetch: Fetch<E>,
    direction: Direction,
    cursor: Cell<usize>,
    predicate: RefCell<Option<Box<dyn IndexedPredicate<E>>>>,
    in_call: Cell<bool>,
    inline: RefCell<Option<Result<Indexed<E>>>>,
}

impl<E: Element> ElementLoop<E> {
    fn run(self: Rc<Self>) {
        if let Some(cause) = self.ctx.token().cause() {
            self.abort(cause);
            return;
        }
        let batch = self.ctx.config().traversal_batch.max(1);
        for _ in 0..batch {
            self.in_call.set(true);
            let this = Rc::clone(&self);
            (self.fetch)(
                self.cursor.get(),
                Box::new(move |answer| {
                    if this.in_call.get() {
                        *this.inline.borrow_mut() = Some(answer);
                    } else if this.step(answer) {
                        this.run();
                    }
                }),
            );
            self.in_call.set(false);
            let answer = self.inline.borrow_mut().take();
            match answer {
                Some(answer) => {
                    if !self.step(answer) {
                        return;
                    }
                }
                // The answer arrives later and resumes the loop itself.
                None => return,
            }
        }
        let this = Rc::clone(&self);
        self.ctx
            .schedule(self.chain, Weight::of_elements(batch), move || this.run());
    }

    /// Feed one answer to the predicate; `true` means keep walking.
    fn step(&self, answer: Result<Indexed<E>>) -> bool {
        let taken = self.predicate.borrow_mut().take();
        let Some(mut predicate) = taken else {
            return false;
        };
        match answer {
            Err(error) => {
                predicate.error(error);
                false
            }
            Ok(Indexed::End { size }) => {
                predicate.complete(size);
                false
            }
            Ok(Indexed::Element { index, element }) => {
                if !predicate.test(index, element) {
                    return false;
                }
                match self.direction {
                    Direction::Ascending => self.cursor.set(index + 1),
                    Direction::Descending { size } => {
                        if index == 0 {
                            predicate.complete(size);
                            return false;
                        }
                        self.cursor.set(index - 1);
                    }
                }
                *self.predicate.borrow_mut() = Some(predicate);
                true
            }
        }
    }

    fn abort(&self, cause: Error) {
        let predicate = self.predicate.borrow_mut().take();
        if let Some(predicate) = predicate {
            predicate.error(cause);
        }
    }
}

/// Visit `from..` in ascending order through per-index lookups.
pub fn next_while_by_element<E: Element>(
    ctx: &Context,
    chain: TaskId,
    fetch: Fetch<E>,
    from: usize,
    predicate: Box<dyn IndexedPredicate<E>>,
) {
    Rc::new(ElementLoop {
        ctx: ctx.clone(),
        chain: ctx.chain_id(chain),
        fetch,
        direction: Direction::Ascending,
        cursor: Cell::new(from),
        predicate: RefCell::new(Some(predicate)),
        in_call: Cell::new(false),
        inline: RefCell::new(None),
    })
    .run();
}

/// Visit `[0, min(from, size - 1)]` in descending order through per-index
/// lookups. `size` must already be resolved.
pub fn prev_while_by_element<E: Element>(
    ctx: &Context,
    chain: TaskId,
    fetch: Fetch<E>,
    from: usize,
    size: usize,
    predicate: Box<dyn IndexedPredicate<E>>,
) {
    if size == 0 {
        predicate.complete(0);
        return;
    }
    Rc::new(ElementLoop {
        ctx: ctx.clone(),
        chain: ctx.chain_id(chain),
        fetch,
        direction: Direction::Descending { size },
        cursor: Cell::new(from.min(size - 1)),
        predicate: RefCell::new(Some(predicate)),
        in_call: Cell::new(false),
        inline: RefCell::new(None),
    })
    .run();
}

/// One forward leg of a stitched traversal.
///
/// Elements of `source` in `[from, until)` are reported at output indices
/// starting from `output`. `until` may be [`UNBOUNDED`].
pub struct Segment<E: Element> {
    pub source: Materializer<E>,
    pub from: usize,
    pub until: usize,
    pub output: usize,
}

impl<E: Element> Segment<E> {
    pub fn new(source: Materializer<E>, from: usize, until: usize, output: usize) -> Self {
        Self {
            source,
            from,
            until,
            output,
        }
    }

    pub fn to_end(source: Materializer<E>, from: usize, output: usize) -> Self {
        Self::new(source, from, UNBOUNDED, output)
    }
}

/// How a segment ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEnd {
    /// The source has an element at `until`; the segment was fully visited.
    Crossed,
    /// The source ran out; `size` is its resolved size.
    Exhausted { size: usize },
}

/// What a stitched traversal does next.
pub enum Plan<E: Element> {
    Next(Segment<E>),
    /// Natural end; report this output size.
    Finish(usize),
    Fail(Error),
}

pub type Planner<E> = Box<dyn FnMut(SegmentEnd) -> Plan<E>>;

struct ForwardChain<E: Element> {
    ctx: Context,
    chain: TaskId,
    planner: RefCell<Planner<E>>,
    predicate: RefCell<Option<Box<dyn IndexedPredicate<E>>>>,
}

impl<E: Element> ForwardChain<E> {
    fn follow(self: &Rc<Self>, plan: Plan<E>) {
        if let Some(cause) = self.ctx.token().cause() {
            self.fail(cause);
            return;
        }
        match plan {
            Plan::Next(segment) => {
                let source = Rc::clone(&segment.source);
                source.materialize_next_while(
                    segment.from,
                    Box::new(SegmentVisitor {
                        chain: Rc::clone(self),
                        from: segment.from,
                        until: segment.until,
                        output: segment.output,
                        ended: false,
                    }),
                );
            }
            Plan::Finish(size) => {
                let predicate = self.predicate.borrow_mut().take();
                if let Some(predicate) = predicate {
                    predicate.complete(size);
                }
            }
            Plan::Fail(error) => self.fail(error),
        }
    }

    fn cross(self: &Rc<Self>, end: SegmentEnd) {
        #[cfg(feature = "tracing")]
        tracing::trace!(task = %self.chain, ?end, "segment boundary");
        let this = Rc::clone(self);
        self.ctx.schedule(self.chain, Weight::ONE, move || {
            let plan = (this.planner.borrow_mut())(end);
            this.follow(plan);
        });
    }

    fn fail(&self, error: Error) {
        let predicate = self.predicate.borrow_mut().take();
        if let Some(predicate) = predicate {
            predicate.error(error);
        }
    }
}

struct SegmentVisitor<E: Element> {
    chain: Rc<ForwardChain<E>>,
    from: usize,
    until: usize,
    output: usize,
    ended: bool,
}

impl<E: Element> IndexedPredicate<E> for SegmentVisitor<E> {
    fn test(&mut self, index: usize, element: E) -> bool {
        if index >= self.until {
            self.ended = true;
            self.chain.cross(SegmentEnd::Crossed);
            return false;
        }
        let taken = self.chain.predicate.borrow_mut().take();
        let Some(mut predicate) = taken else {
            return false;
        };
        let output = self.output + (index - self.from);
        if predicate.test(output, element) {
            *self.chain.predicate.borrow_mut() = Some(predicate);
            true
        } else {
            false
        }
    }

    fn complete(self: Box<Self>, size: usize) {
        if !self.ended {
            self.chain.cross(SegmentEnd::Exhausted { size });
        }
    }

    fn error(self: Box<Self>, error: Error) {
        self.chain.fail(error);
    }
}

/// Forward traversal stitched from upstream segments. `first` is the initial
/// plan; `planner` is consulted every time a segment ends.
pub fn next_while_segments<E: Element>(
    ctx: &Context,
    chain: TaskId,
    first: Plan<E>,
    planner: Planner<E>,
    predicate: Box<dyn IndexedPredicate<E>>,
) {
    Rc::new(ForwardChain {
        ctx: ctx.clone(),
        chain: ctx.chain_id(chain),
        planner: RefCell::new(planner),
        predicate: RefCell::new(Some(predicate)),
    })
    .follow(first);
}

/// One backward leg: elements of `source` from `from` down to `down_to`
/// (inclusive), reported at output indices ending at `output` for `from`.
pub struct BackSegment<E: Element> {
    pub source: Materializer<E>,
    pub from: usize,
    pub down_to: usize,
    pub output: usize,
}

struct BackwardChain<E: Element> {
    ctx: Context,
    chain: TaskId,
    size: usize,
    segments: RefCell<VecDeque<BackSegment<E>>>,
    predicate: RefCell<Option<Box<dyn IndexedPredicate<E>>>>,
}

impl<E: Element> BackwardChain<E> {
    fn advance(self: &Rc<Self>) {
        if let Some(cause) = self.ctx.token().cause() {
            self.fail(cause);
            return;
        }
        let next = self.segments.borrow_mut().pop_front();
        match next {
            Some(segment) if segment.from < segment.down_to => self.advance(),
            Some(segment) => {
                let source = Rc::clone(&segment.source);
                source.materialize_prev_while(
                    segment.from,
                    Box::new(BackVisitor {
                        chain: Rc::clone(self),
                        from: segment.from,
                        down_to: segment.down_to,
                        output: segment.output,
                        ended: false,
                    }),
                );
            }
            None => {
                let predicate = self.predicate.borrow_mut().take();
                if let Some(predicate) = predicate {
                    predicate.complete(self.size);
                }
            }
        }
    }

    fn cross(self: &Rc<Self>) {
        let this = Rc::clone(self);
        self.ctx
            .schedule(self.chain, Weight::ONE, move || this.advance());
    }

    fn fail(&self, error: Error) {
        let predicate = self.predicate.borrow_mut().take();
        if let Some(predicate) = predicate {
            predicate.error(error);
        }
    }
}

struct BackVisitor<E: Element> {
    chain: Rc<BackwardChain<E>>,
    from: usize,
    down_to: usize,
    output: usize,
    ended: bool,
}

impl<E: Element> IndexedPredicate<E> for BackVisitor<E> {
    fn test(&mut self, index: usize, element: E) -> bool {
        if index < self.down_to {
            self.ended = true;
            self.chain.cross();
            return false;
        }
        let taken = self.chain.predicate.borrow_mut().take();
        let Some(mut predicate) = taken else {
            return false;
        };
        let output = self.output - (self.from - index);
        if predicate.test(output, element) {
            *self.chain.predicate.borrow_mut() = Some(predicate);
            true
        } else {
            false
        }
    }

    fn complete(self: Box<Self>, _size: usize) {
        if !self.ended {
            self.chain.cross();
        }
    }

    fn error(self: Box<Self>, error: Error) {
        self.chain.fail(error);
    }
}

/// Backward traversal over segments listed from the highest output indices
/// down. Completes with `size`, the resolved output size.
pub fn prev_while_segments<E: Element>(
    ctx: &Context,
    chain: TaskId,
    segments: Vec<BackSegment<E>>,
    size: usize,
    predicate: Box<dyn IndexedPredicate<E>>,
) {
    Rc::new(BackwardChain {
        ctx: ctx.clone(),
        chain: ctx.chain_id(chain),
        size,
        segments: RefCell::new(segments.into()),
        predicate: RefCell::new(Some(predicate)),
    })
    .advance();
}

/// Elements gathered by a [`RangeCollector`].
#[derive(Debug, Clone, PartialEq)]
pub struct Collected<E> {
    pub items: Vec<E>,
    /// Resolved upstream size, when the traversal ran off the end.
    pub size: Option<usize>,
}

/// Predicate collecting `[from, until)` into a vector. The callback fires
/// when the bound is reached or the traversal completes.
pub struct RangeCollector<E> {
    until: usize,
    items: Vec<E>,
    callback: Option<ValueCallback<Collected<E>>>,
}

impl<E: Element> RangeCollector<E> {
    pub fn boxed(
        until: usize,
        callback: ValueCallback<Collected<E>>,
    ) -> Box<dyn IndexedPredicate<E>> {
        Box::new(Self {
            until,
            items: Vec::new(),
            callback: Some(callback),
        })
    }

    fn finish(&mut self, size: Option<usize>) {
        if let Some(callback) = self.callback.take() {
            callback(Ok(Collected {
                items: std::mem::take(&mut self.items),
                size,
            }));
        }
    }
}

impl<E: Element> IndexedPredicate<E> for RangeCollector<E> {
    fn test(&mut self, index: usize, element: E) -> bool {
        if index >= self.until {
            self.finish(None);
            return false;
        }
        self.items.push(element);
        if index + 1 >= self.until {
            self.finish(None);
            return false;
        }
        true
    }

    fn complete(mut self: Box<Self>, size: usize) {
        self.finish(Some(size));
    }

    fn error(mut self: Box<Self>, error: Error) {
        if let Some(callback) = self.callback.take() {
            callback(Err(error));
        }
    }
}

/// Collect every element of `source` through its forward traversal.
pub fn collect_all<E: Element>(source: &Materializer<E>, callback: ValueCallback<Vec<E>>) {
    source.materialize_next_while(
        0,
        RangeCollector::boxed(
            UNBOUNDED,
            Box::new(move |collected| callback(collected.map(|c| c.items))),
        ),
    );
}
