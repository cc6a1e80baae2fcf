use std::borrow::Cow;
use std::fmt::{self, Debug, Display, Formatter};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::Interrupt;
use crate::leaf::{AsyncFn, Condition, InstantFn, Leaf, PredicateFn};
use crate::Outcome;

/// The construction form of a behavior tree.
///
/// Build a `Node` with the fluent helpers ([`sequence`], [`selector`],
/// [`when`], [`instant`], [`action`]) and compile it once into a [`Tree`].
pub enum Node<C> {
    Action(Leaf<C>),
    /// Succeeds iff every child succeeds, stopping at the first failure.
    Sequence(Vec<Node<C>>),
    /// Succeeds on the first child that succeeds.
    Selector(Vec<Node<C>>),
    /// Fails without evaluating the child when the condition does not hold.
    Conditional(Condition<C>, Box<Node<C>>),
}

impl<C> Node<C> {
    pub fn conditional(condition: Condition<C>, child: Node<C>) -> Self {
        Self::Conditional(condition, Box::new(child))
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            match node {
                Self::Action(_) => {}
                Self::Sequence(children) | Self::Selector(children) => {
                    stack.extend(children.iter().map(|child| (child, depth + 1)))
                }
                Self::Conditional(_, child) => stack.push((child, depth + 1)),
            }
        }
        deepest
    }
}

impl<C> Debug for Node<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Action(leaf) => f.debug_tuple("Action").field(leaf).finish(),
            Self::Sequence(children) => f.debug_tuple("Sequence").field(children).finish(),
            Self::Selector(children) => f.debug_tuple("Selector").field(children).finish(),
            Self::Conditional(condition, child) => f
                .debug_tuple("Conditional")
                .field(condition)
                .field(child)
                .finish(),
        }
    }
}

/// An action that resolves in the same tick it starts.
pub fn instant<C>(name: impl Into<Cow<'static, str>>, body: InstantFn<C>) -> Node<C> {
    Node::Action(Leaf::instant(name, body))
}

/// An action that may suspend across ticks.
pub fn action<C>(name: impl Into<Cow<'static, str>>, body: AsyncFn<C>) -> Node<C> {
    Node::Action(Leaf::action(name, body))
}

pub fn sequence<C>(children: impl IntoIterator<Item = Node<C>>) -> Node<C> {
    Node::Sequence(children.into_iter().collect())
}

pub fn selector<C>(children: impl IntoIterator<Item = Node<C>>) -> Node<C> {
    Node::Selector(children.into_iter().collect())
}

pub fn condition<C>(name: impl Into<Cow<'static, str>>, test: PredicateFn<C>) -> Condition<C> {
    Condition::new(name, test)
}

/// Evaluate `child` only if `test` holds, otherwise fail.
///
/// Used as a [`selector`] branch this reads as one arm of an
/// if / else-if chain: a false guard falls through to the next branch.
pub fn when<C>(
    name: impl Into<Cow<'static, str>>,
    test: PredicateFn<C>,
    child: Node<C>,
) -> Node<C> {
    Node::conditional(Condition::new(name, test), child)
}

/// Evaluate `child` only if `test` does not hold, otherwise fail.
pub fn unless<C>(
    name: impl Into<Cow<'static, str>>,
    test: PredicateFn<C>,
    child: Node<C>,
) -> Node<C> {
    Node::conditional(Condition::new(name, test).negate(), child)
}

/// Index of a node inside a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composite {
    Sequence,
    Selector,
}

impl Composite {
    /// The child outcome that stops the iteration and becomes the result.
    fn short_circuits_on(self) -> Outcome {
        match self {
            Self::Sequence => Outcome::Failed,
            Self::Selector => Outcome::Succeeded,
        }
    }

    /// The result when no child stopped the iteration, including the empty case.
    fn exhausted(self) -> Outcome {
        self.short_circuits_on().invert()
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Sequence => "Sequence",
            Self::Selector => "Selector",
        }
    }
}

enum SlotKind<C> {
    Action(Leaf<C>),
    Composite {
        composite: Composite,
        first_child: Option<NodeId>,
        len: usize,
    },
    Conditional {
        condition: Condition<C>,
        child: NodeId,
    },
}

struct Slot<C> {
    kind: SlotKind<C>,
    parent: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

/// A compiled, immutable behavior tree.
///
/// Nodes are stored in pre-order in a flat arena where each node knows its
/// parent and its next sibling. Evaluation walks these links instead of
/// recursing, so it neither allocates nor grows the call stack with the
/// depth of the tree. Compilation and rendering use explicit work stacks
/// too. A `Tree` holds no per-evaluation state and can be shared behind an
/// `Arc` by any number of contexts.
///
/// A [`Node`] that is dropped without being compiled is dropped
/// recursively, so keep uncompiled nodes shallow.
pub struct Tree<C> {
    name: String,
    slots: Box<[Slot<C>]>,
    depth: usize,
}

impl<C> Tree<C> {
    pub fn new(name: impl Into<String>, root: Node<C>) -> Self {
        let (slots, depth) = compile(root);
        Self {
            name: name.into(),
            slots: slots.into_boxed_slice(),
            depth,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slots.get(id.0).and_then(|slot| slot.parent)
    }

    pub fn node(&self, id: NodeId) -> Option<NodeView<'_, C>> {
        let slot = self.slots.get(id.0)?;
        Some(match &slot.kind {
            SlotKind::Action(leaf) => NodeView::Action(leaf),
            SlotKind::Composite {
                composite,
                first_child,
                len,
            } => NodeView::Composite(
                *composite,
                Children {
                    tree: self,
                    next: *first_child,
                    remaining: *len,
                },
            ),
            SlotKind::Conditional { condition, child } => NodeView::Conditional(condition, *child),
        })
    }

    pub async fn evaluate(
        &self,
        ctx: &mut C,
        cancel: &CancellationToken,
    ) -> Result<Outcome, Interrupt> {
        self.evaluate_node(self.root(), ctx, cancel).await
    }

    /// Evaluate the subtree rooted at `start`.
    ///
    /// Children of a composite are evaluated strictly in order and a child
    /// starts only after its predecessor resolved. Faults are not caught here;
    /// they end the traversal immediately. Once `cancel` fires the result is
    /// [`Interrupt::Cancelled`], even if the leaf running at that moment went
    /// on to resolve.
    ///
    /// # Panics
    ///
    /// Panics if `start` does not belong to this tree.
    pub async fn evaluate_node(
        &self,
        start: NodeId,
        ctx: &mut C,
        cancel: &CancellationToken,
    ) -> Result<Outcome, Interrupt> {
        if cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        let mut current = start;
        'descend: loop {
            let mut outcome = match &self.slots[current.0].kind {
                SlotKind::Action(leaf) => {
                    let outcome = leaf.run(ctx, cancel).await?;
                    if cancel.is_cancelled() {
                        debug!(leaf = %leaf.name(), "cancelled while the leaf was running");
                        return Err(Interrupt::Cancelled);
                    }
                    outcome
                }
                SlotKind::Conditional { condition, child } => {
                    if cancel.is_cancelled() {
                        return Err(Interrupt::Cancelled);
                    }
                    if condition.test(ctx) {
                        current = *child;
                        continue 'descend;
                    }
                    trace!(condition = %condition.name(), "condition not met");
                    Outcome::Failed
                }
                SlotKind::Composite {
                    composite,
                    first_child,
                    ..
                } => match first_child {
                    Some(child) => {
                        current = *child;
                        continue 'descend;
                    }
                    None => composite.exhausted(),
                },
            };

            // Climb back up until a composite has another child to try.
            loop {
                if current == start {
                    return Ok(outcome);
                }
                let slot = &self.slots[current.0];
                let Some(parent) = slot.parent else {
                    return Ok(outcome);
                };
                if let SlotKind::Composite { composite, .. } = &self.slots[parent.0].kind {
                    if outcome != composite.short_circuits_on() {
                        if let Some(next) = slot.next_sibling {
                            current = next;
                            continue 'descend;
                        }
                        outcome = composite.exhausted();
                    }
                }
                current = parent;
            }
        }
    }
}

enum Render {
    Open(NodeId, usize),
    Close(usize),
}

impl<C> From<Node<C>> for Tree<C> {
    fn from(root: Node<C>) -> Self {
        Self::new("main", root)
    }
}

impl<C> Debug for Tree<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct("Tree")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("depth", &self.depth)
            .finish()
    }
}

/// Renders the tree in the text format understood by [`crate::parse_file`].
impl<C> Display for Tree<C> {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "tree {} = ", self.name)?;

        let mut stack = vec![Render::Open(self.root(), 0)];
        while let Some(item) = stack.pop() {
            let (id, indent) = match item {
                Render::Open(id, indent) => (id, indent),
                Render::Close(indent) => {
                    writeln!(f, "{:pad$}}}", "", pad = indent * 4)?;
                    continue;
                }
            };
            let pad = indent * 4;
            match self.node(id) {
                None => {}
                Some(NodeView::Action(leaf)) => writeln!(f, "{:pad$}{}", "", leaf.name())?,
                Some(NodeView::Composite(composite, children)) => {
                    if children.len() == 0 {
                        writeln!(f, "{:pad$}{} {{}}", "", composite.keyword())?;
                        continue;
                    }
                    writeln!(f, "{:pad$}{} {{", "", composite.keyword())?;
                    stack.push(Render::Close(indent));
                    let first = stack.len();
                    stack.extend(children.map(|child| Render::Open(child, indent + 1)));
                    stack[first..].reverse();
                }
                Some(NodeView::Conditional(condition, child)) => {
                    let bang = if condition.is_negated() { "!" } else { "" };
                    writeln!(f, "{:pad$}if ({}{}) {{", "", bang, condition.name())?;
                    stack.push(Render::Close(indent));
                    stack.push(Render::Open(child, indent + 1));
                }
            }
        }
        Ok(())
    }
}

pub enum NodeView<'t, C> {
    Action(&'t Leaf<C>),
    Composite(Composite, Children<'t, C>),
    Conditional(&'t Condition<C>, NodeId),
}

/// Iterator over the children of a composite node.
pub struct Children<'t, C> {
    tree: &'t Tree<C>,
    next: Option<NodeId>,
    remaining: usize,
}

impl<'t, C> Iterator for Children<'t, C> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.slots[id.0].next_sibling;
        self.remaining -= 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'t, C> ExactSizeIterator for Children<'t, C> {}

/// Flatten `root` into pre-order slots, returning them with the tree depth.
fn compile<C>(root: Node<C>) -> (Vec<Slot<C>>, usize) {
    let mut slots: Vec<Slot<C>> = Vec::new();
    // Last child emitted so far for each slot, to link up next siblings.
    let mut last_child: Vec<Option<NodeId>> = Vec::new();
    let mut depth = 0;

    let mut stack = vec![(root, None::<NodeId>, 1)];
    while let Some((node, parent, level)) = stack.pop() {
        let id = NodeId(slots.len());
        depth = depth.max(level);

        if let Some(parent) = parent {
            match last_child[parent.0].replace(id) {
                Some(prev) => slots[prev.0].next_sibling = Some(id),
                None => {
                    if let SlotKind::Composite { first_child, .. } = &mut slots[parent.0].kind {
                        *first_child = Some(id);
                    }
                }
            }
        }

        let kind = match node {
            Node::Action(leaf) => SlotKind::Action(leaf),
            Node::Sequence(children) => push_children(Composite::Sequence, children, id, level, &mut stack),
            Node::Selector(children) => push_children(Composite::Selector, children, id, level, &mut stack),
            Node::Conditional(condition, child) => {
                stack.push((*child, Some(id), level + 1));
                SlotKind::Conditional {
                    // Pre-order: the only child lands right after its parent.
                    condition,
                    child: NodeId(id.0 + 1),
                }
            }
        };
        slots.push(Slot {
            kind,
            parent,
            next_sibling: None,
        });
        last_child.push(None);
    }
    (slots, depth)
}

fn push_children<C>(
    composite: Composite,
    children: Vec<Node<C>>,
    id: NodeId,
    level: usize,
    stack: &mut Vec<(Node<C>, Option<NodeId>, usize)>,
) -> SlotKind<C> {
    let len = children.len();
    // Reversed so the first child is popped, and numbered, first.
    stack.extend(children.into_iter().rev().map(|child| (child, Some(id), level + 1)));
    SlotKind::Composite {
        composite,
        first_child: None,
        len,
    }
}
