//! Host-side mirror of the plugin's UI tree
//!
//! The registry owns every node by id. Parents (including the root
//! container) only hold ordered child ids, so a node has exactly one owner
//! and one place in the tree. Each mutation is validated in full before the
//! tree is touched; a rejected mutation leaves no trace.
//!
//! Re-rendering is scoped: root-level mutations call the root callback with
//! the full root child list, every other mutation calls the callback the
//! host registered for the affected node.

use std::collections::{HashMap, HashSet};
use std::fmt;

use xnft_bridge_api::{Element, NodeId, NodeKind, Props, Style, UpdateDiff};

use crate::error::{BridgeError, InvariantViolation, StateError};
use crate::mutation::Mutation;

/// Callback re-rendering a single node and its subtree
pub type RenderFn = Box<dyn FnMut(&Element) + Send>;

/// Callback re-rendering the ordered root children
pub type RenderRootFn = Box<dyn FnMut(&[Element]) + Send>;

/// Where a node is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Root,
    Node(NodeId),
}

/// A registered node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    props: Props,
    style: Option<Style>,
    text: Option<String>,
    children: Vec<NodeId>,
    parent: Parent,
}

impl Node {
    /// Plugin-assigned id
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Node kind, parsed when the node was attached
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Kind-specific props, as merged by updates
    pub fn props(&self) -> &Props {
        &self.props
    }

    /// Current style, if any was set
    pub fn style(&self) -> Option<&Style> {
        self.style.as_ref()
    }

    /// Literal text content
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Ordered child ids
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Where the node is attached
    pub fn parent(&self) -> Parent {
        self.parent
    }

    /// Merge the fields of `diff` this node's kind allows to change
    fn merge(&mut self, diff: UpdateDiff) {
        match self.kind {
            NodeKind::Container | NodeKind::Text | NodeKind::Button => {
                self.merge_style(diff.style);
            }
            NodeKind::Image => {
                self.merge_style(diff.style);
                if let Some(src) = diff.src {
                    self.props.insert("src".into(), src.into());
                }
            }
            NodeKind::TextField => {
                if let Some(value) = diff.value {
                    self.props.insert("value".into(), value);
                }
            }
            NodeKind::NavAnimation => {
                if let Some(route_name) = diff.route_name {
                    self.props.insert("routeName".into(), route_name.into());
                }
            }
            NodeKind::Path => {
                if let Some(fill) = diff.fill {
                    self.props.insert("fill".into(), fill.into());
                }
            }
        }
    }

    fn merge_style(&mut self, style: Option<Style>) {
        if let Some(style) = style {
            self.style = Some(style);
        }
    }
}

/// A validated attach, ready to commit
enum Staged {
    /// The id is already live; the existing subtree moves
    Existing(NodeId),
    /// A fresh subtree, flattened root first
    New(NodeId, Vec<Node>),
}

impl Staged {
    fn id(&self) -> NodeId {
        match self {
            Self::Existing(id) | Self::New(id, _) => *id,
        }
    }
}

/// The node registry plus the root container
#[derive(Default)]
pub struct VirtualTree {
    nodes: HashMap<NodeId, Node>,
    root: Vec<NodeId>,
    render_fns: HashMap<NodeId, RenderFn>,
    render_root_fn: Option<RenderRootFn>,
    /// A root render happened before the root callback existed
    needs_render_root: bool,
}

impl VirtualTree {
    /// Create an empty tree with no render callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the root render callback
    ///
    /// Fires immediately if a root-level mutation was applied before any
    /// callback existed.
    pub fn on_render_root(&mut self, f: RenderRootFn) {
        self.render_root_fn = Some(f);
        if self.needs_render_root {
            self.needs_render_root = false;
            self.render_root();
        }
    }

    /// Register the render callback for one node
    pub fn on_render(&mut self, id: NodeId, f: RenderFn) {
        self.render_fns.insert(id, f);
    }

    /// Drop every node and callback
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root.clear();
        self.render_fns.clear();
        self.render_root_fn = None;
        self.needs_render_root = false;
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Look up a registered node
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Ordered ids of the root container's children
    pub fn root_ids(&self) -> &[NodeId] {
        &self.root
    }

    /// Whether the host registered a render callback for `id`
    pub fn has_render_fn(&self, id: NodeId) -> bool {
        self.render_fns.contains_key(&id)
    }

    /// Serialize a node and its subtree
    pub fn element(&self, id: NodeId) -> Option<Element> {
        let node = self.nodes.get(&id)?;
        Some(Element {
            id,
            kind: node.kind.as_str().to_string(),
            props: node.props.clone(),
            style: node.style.clone(),
            text: node.text.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.element(*child))
                .collect(),
        })
    }

    /// Serialize the root container's children
    pub fn root_elements(&self) -> Vec<Element> {
        self.root.iter().filter_map(|id| self.element(*id)).collect()
    }

    /// Apply one mutation
    pub fn apply(&mut self, mutation: Mutation) -> Result<(), BridgeError> {
        match mutation {
            Mutation::AppendToRoot { element } => self.append_to_root(element),
            Mutation::AppendChild { parent, element } => self.append_child(parent, element),
            Mutation::InsertInRootBefore { element, before } => {
                self.insert_in_root_before(element, before)
            }
            Mutation::InsertBefore {
                parent,
                element,
                before,
            } => self.insert_before(parent, element, before),
            Mutation::RemoveFromRoot { id } => self.remove_from_root(id),
            Mutation::RemoveChild { parent, id } => self.remove_child(parent, id),
            Mutation::CommitUpdate { id, diff } => self.commit_update(id, diff),
            Mutation::CommitTextUpdate { id, text } => self.commit_text_update(id, text),
        }
    }

    /// Attach `element` at the end of the root list, or move it there if live
    pub fn append_to_root(&mut self, element: Element) -> Result<(), BridgeError> {
        let staged = self.stage(&element, Parent::Root)?;
        let previous = self.attach(staged, Parent::Root, None)?;
        self.render_root();
        self.render_previous(previous, Parent::Root);
        Ok(())
    }

    /// Attach `element` as the last child of `parent`, or move it there if live
    pub fn append_child(&mut self, parent: NodeId, element: Element) -> Result<(), BridgeError> {
        self.ensure_renderable(parent)?;
        let staged = self.stage(&element, Parent::Node(parent))?;
        let previous = self.attach(staged, Parent::Node(parent), None)?;
        self.render(parent);
        self.render_previous(previous, Parent::Node(parent));
        Ok(())
    }

    /// Insert or move `element` directly before `before` in the root list
    pub fn insert_in_root_before(
        &mut self,
        element: Element,
        before: NodeId,
    ) -> Result<(), BridgeError> {
        if element.id == before || !self.root.contains(&before) {
            return Err(StateError::NodeNotFound(before).into());
        }
        let staged = self.stage(&element, Parent::Root)?;
        let previous = self.attach(staged, Parent::Root, Some(before))?;
        self.render_root();
        self.render_previous(previous, Parent::Root);
        Ok(())
    }

    /// Insert or move `element` directly before `before` under `parent`
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        element: Element,
        before: NodeId,
    ) -> Result<(), BridgeError> {
        self.ensure_renderable(parent)?;
        if element.id == before || !self.children_of(Parent::Node(parent)).contains(&before) {
            return Err(StateError::NodeNotFound(before).into());
        }
        let staged = self.stage(&element, Parent::Node(parent))?;
        let previous = self.attach(staged, Parent::Node(parent), Some(before))?;
        self.render(parent);
        self.render_previous(previous, Parent::Node(parent));
        Ok(())
    }

    /// Remove a root child and deregister its whole subtree
    pub fn remove_from_root(&mut self, id: NodeId) -> Result<(), BridgeError> {
        if !self.root.contains(&id) {
            return Err(StateError::NodeNotFound(id).into());
        }
        self.root.retain(|child| *child != id);
        self.deregister(id);
        self.render_root();
        Ok(())
    }

    /// Remove a child of `parent` and deregister its whole subtree
    pub fn remove_child(&mut self, parent: NodeId, id: NodeId) -> Result<(), BridgeError> {
        self.ensure_renderable(parent)?;
        if !self.children_of(Parent::Node(parent)).contains(&id) {
            return Err(StateError::NodeNotFound(id).into());
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|child| *child != id);
        }
        self.deregister(id);
        self.render(parent);
        Ok(())
    }

    /// Merge the fields of `diff` the node's kind honours, then re-render it
    pub fn commit_update(&mut self, id: NodeId, diff: UpdateDiff) -> Result<(), BridgeError> {
        self.ensure_renderable(id)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.merge(diff);
        }
        self.render(id);
        Ok(())
    }

    /// Replace the node's text and re-render it
    pub fn commit_text_update(&mut self, id: NodeId, text: String) -> Result<(), BridgeError> {
        self.ensure_renderable(id)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.text = Some(text);
        }
        self.render(id);
        Ok(())
    }

    fn ensure_renderable(&self, id: NodeId) -> Result<(), StateError> {
        if !self.nodes.contains_key(&id) {
            return Err(StateError::NodeNotFound(id));
        }
        if !self.render_fns.contains_key(&id) {
            return Err(StateError::RenderCallbackNotFound(id));
        }
        Ok(())
    }

    fn children_of(&self, parent: Parent) -> &[NodeId] {
        match parent {
            Parent::Root => &self.root,
            Parent::Node(id) => self
                .nodes
                .get(&id)
                .map(|node| node.children.as_slice())
                .unwrap_or(&[]),
        }
    }

    fn children_mut(&mut self, parent: Parent) -> Result<&mut Vec<NodeId>, StateError> {
        match parent {
            Parent::Root => Ok(&mut self.root),
            Parent::Node(id) => self
                .nodes
                .get_mut(&id)
                .map(|node| &mut node.children)
                .ok_or(StateError::NodeNotFound(id)),
        }
    }

    /// Validate an element for attachment under `parent`
    fn stage(&self, element: &Element, parent: Parent) -> Result<Staged, InvariantViolation> {
        if self.nodes.contains_key(&element.id) {
            if let Parent::Node(parent_id) = parent {
                if self.is_within(parent_id, element.id) {
                    return Err(InvariantViolation::Cycle {
                        id: element.id,
                        parent: parent_id,
                    });
                }
            }
            return Ok(Staged::Existing(element.id));
        }

        let mut seen = HashSet::new();
        let mut nodes = Vec::new();
        let mut stack = vec![(element, parent)];
        while let Some((current, parent)) = stack.pop() {
            if self.nodes.contains_key(&current.id) || !seen.insert(current.id) {
                return Err(InvariantViolation::DuplicateNode(current.id));
            }
            nodes.push(Node {
                id: current.id,
                kind: current.node_kind()?,
                props: current.props.clone(),
                style: current.style.clone(),
                text: current.text.clone(),
                children: current.children.iter().map(|child| child.id).collect(),
                parent,
            });
            stack.extend(
                current
                    .children
                    .iter()
                    .rev()
                    .map(|child| (child, Parent::Node(current.id))),
            );
        }
        Ok(Staged::New(element.id, nodes))
    }

    /// Whether `id` is `ancestor` or lies in its subtree
    fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = match self.nodes.get(&candidate).map(|node| node.parent) {
                Some(Parent::Node(next)) => Some(next),
                _ => None,
            };
        }
        false
    }

    /// Link a staged node under `parent`, returning its old parent on a move
    fn attach(
        &mut self,
        staged: Staged,
        parent: Parent,
        before: Option<NodeId>,
    ) -> Result<Option<Parent>, StateError> {
        let id = staged.id();
        let previous = match staged {
            Staged::Existing(id) => self.detach(id),
            Staged::New(_, nodes) => {
                for node in nodes {
                    self.nodes.insert(node.id, node);
                }
                None
            }
        };
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = parent;
        }

        let siblings = self.children_mut(parent)?;
        let index = before
            .and_then(|before| siblings.iter().position(|child| *child == before))
            .unwrap_or(siblings.len());
        siblings.insert(index, id);
        Ok(previous)
    }

    /// Unlink a live node from its parent's child list
    fn detach(&mut self, id: NodeId) -> Option<Parent> {
        let parent = self.nodes.get(&id).map(|node| node.parent)?;
        if let Ok(siblings) = self.children_mut(parent) {
            siblings.retain(|child| *child != id);
        }
        Some(parent)
    }

    /// Remove a node, its descendants and their callbacks from the registry
    fn deregister(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
            self.render_fns.remove(&current);
        }
    }

    fn render(&mut self, id: NodeId) {
        let Some(element) = self.element(id) else {
            return;
        };
        if let Some(render) = self.render_fns.get_mut(&id) {
            render(&element);
        }
    }

    /// Re-render the parent a moved node left, so it is shown in one place only
    fn render_previous(&mut self, previous: Option<Parent>, current: Parent) {
        match previous {
            Some(Parent::Root) if current != Parent::Root => self.render_root(),
            Some(Parent::Node(id)) if current != Parent::Node(id) => self.render(id),
            _ => {}
        }
    }

    fn render_root(&mut self) {
        let elements = self.root_elements();
        match self.render_root_fn.as_mut() {
            Some(render) => render(elements.as_slice()),
            None => {
                tracing::debug!("root render deferred until a root callback is registered");
                self.needs_render_root = true;
            }
        }
    }
}

impl fmt::Debug for VirtualTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTree")
            .field("nodes", &self.nodes.len())
            .field("root", &self.root)
            .field("render_fns", &self.render_fns.len())
            .field("needs_render_root", &self.needs_render_root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    fn container(id: NodeId) -> Element {
        Element::new(id, NodeKind::Container)
    }

    fn style(color: &str) -> Style {
        json!({ "color": color }).as_object().cloned().unwrap()
    }

    fn tree_with_root_log() -> (VirtualTree, Log) {
        let log: Log = Arc::default();
        let mut tree = VirtualTree::new();
        let sink = log.clone();
        tree.on_render_root(Box::new(move |children: &[Element]| {
            let ids: Vec<String> = children.iter().map(|c| c.id.to_string()).collect();
            sink.lock().unwrap().push(format!("root:[{}]", ids.join(",")));
        }));
        (tree, log)
    }

    fn watch(tree: &mut VirtualTree, id: NodeId, log: &Log) {
        let sink = log.clone();
        tree.on_render(
            id,
            Box::new(move |element: &Element| sink.lock().unwrap().push(format!("node:{}", element.id))),
        );
    }

    /// Registry and reachable nodes must be the same set
    fn assert_bijection(tree: &VirtualTree) {
        let mut reachable = HashSet::new();
        let mut stack: Vec<NodeId> = tree.root_ids().to_vec();
        while let Some(id) = stack.pop() {
            assert!(reachable.insert(id), "node {} reachable twice", id);
            let node = tree.get(id).expect("reachable node missing from registry");
            stack.extend(node.children());
        }
        assert_eq!(reachable.len(), tree.len());
    }

    #[test]
    fn test_append_registers_subtree() {
        let (mut tree, log) = tree_with_root_log();
        let element = container(1).child(container(2).child(Element::new(3, NodeKind::Text)));

        tree.append_to_root(element).unwrap();

        assert_eq!(tree.root_ids(), &[1]);
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.get(3).unwrap().parent(), Parent::Node(2));
        assert_eq!(*log.lock().unwrap(), vec!["root:[1]"]);
        assert_bijection(&tree);
    }

    #[test]
    fn test_append_child_renders_parent_only() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1)).unwrap();
        watch(&mut tree, 1, &log);
        log.lock().unwrap().clear();

        tree.append_child(1, Element::new(2, NodeKind::Button)).unwrap();

        assert_eq!(tree.get(1).unwrap().children(), &[2]);
        assert_eq!(*log.lock().unwrap(), vec!["node:1"]);
    }

    #[test]
    fn test_append_child_without_callback() {
        let (mut tree, _log) = tree_with_root_log();
        tree.append_to_root(container(1)).unwrap();

        let err = tree.append_child(1, container(2)).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::State(StateError::RenderCallbackNotFound(1))
        ));
        assert!(!tree.contains(2));
    }

    #[test]
    fn test_insert_in_root_before_new_and_existing_agree() {
        let (mut fresh, _) = tree_with_root_log();
        fresh.append_to_root(container(1)).unwrap();
        fresh.append_to_root(container(2)).unwrap();
        fresh.insert_in_root_before(container(3), 1).unwrap();

        let (mut moved, _) = tree_with_root_log();
        moved.append_to_root(container(1)).unwrap();
        moved.append_to_root(container(2)).unwrap();
        moved.append_to_root(container(3)).unwrap();
        moved.insert_in_root_before(container(3), 1).unwrap();

        assert_eq!(fresh.root_ids(), &[3, 1, 2]);
        assert_eq!(moved.root_ids(), fresh.root_ids());
        assert_bijection(&moved);
    }

    #[test]
    fn test_insert_before_moves_existing_child() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1).child(container(2)).child(container(3)))
            .unwrap();
        watch(&mut tree, 1, &log);

        tree.insert_before(1, container(3), 2).unwrap();
        assert_eq!(tree.get(1).unwrap().children(), &[3, 2]);

        // Idempotent when already in place
        tree.insert_before(1, container(3), 2).unwrap();
        assert_eq!(tree.get(1).unwrap().children(), &[3, 2]);
        assert_bijection(&tree);
    }

    #[test]
    fn test_insert_before_keeps_existing_subtree() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1).child(container(2)).child(container(3).child(container(4))))
            .unwrap();
        watch(&mut tree, 1, &log);

        tree.insert_before(1, container(3), 2).unwrap();

        assert_eq!(tree.get(3).unwrap().children(), &[4]);
        assert!(tree.contains(4));
    }

    #[test]
    fn test_insert_before_missing_targets() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1).child(container(2))).unwrap();
        watch(&mut tree, 1, &log);

        assert!(matches!(
            tree.insert_before(9, container(5), 2),
            Err(BridgeError::State(StateError::NodeNotFound(9)))
        ));
        assert!(matches!(
            tree.insert_before(1, container(5), 8),
            Err(BridgeError::State(StateError::NodeNotFound(8)))
        ));
        assert!(matches!(
            tree.insert_in_root_before(container(5), 8),
            Err(BridgeError::State(StateError::NodeNotFound(8)))
        ));
        assert!(!tree.contains(5));
    }

    #[test]
    fn test_move_between_parents() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1).child(container(3))).unwrap();
        tree.append_to_root(container(2)).unwrap();
        watch(&mut tree, 2, &log);
        let seen: Arc<Mutex<Option<Vec<NodeId>>>> = Arc::default();
        let last = seen.clone();
        tree.on_render(
            1,
            Box::new(move |element: &Element| {
                *last.lock().unwrap() = Some(element.children.iter().map(|c| c.id).collect());
            }),
        );
        log.lock().unwrap().clear();

        tree.append_child(2, container(3)).unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(vec![]));
        assert_eq!(*log.lock().unwrap(), vec!["node:2"]);
        assert!(tree.get(1).unwrap().children().is_empty());
        assert_eq!(tree.get(2).unwrap().children(), &[3]);
        assert_eq!(tree.get(3).unwrap().parent(), Parent::Node(2));
        assert_bijection(&tree);
    }

    #[test]
    fn test_move_across_root_renders_both_sides() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1).child(container(3))).unwrap();
        tree.append_to_root(container(2)).unwrap();
        watch(&mut tree, 1, &log);
        watch(&mut tree, 2, &log);
        log.lock().unwrap().clear();

        tree.append_to_root(container(3)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["root:[1,2,3]", "node:1"]);

        log.lock().unwrap().clear();
        tree.append_child(2, container(3)).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["node:2", "root:[1,2]"]);

        // Reordering within one parent renders it once
        log.lock().unwrap().clear();
        tree.insert_in_root_before(container(2), 1).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["root:[2,1]"]);
        assert_bijection(&tree);
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1).child(container(2))).unwrap();
        watch(&mut tree, 2, &log);

        let err = tree.append_child(2, container(1)).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Invariant(InvariantViolation::Cycle { id: 1, parent: 2 })
        ));
        assert_eq!(tree.root_ids(), &[1]);
        assert_bijection(&tree);
    }

    #[test]
    fn test_duplicate_id_in_new_subtree() {
        let (mut tree, _) = tree_with_root_log();
        tree.append_to_root(container(1)).unwrap();

        let err = tree
            .append_to_root(container(2).child(container(1)))
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Invariant(InvariantViolation::DuplicateNode(1))
        ));
        assert!(!tree.contains(2));
        assert_bijection(&tree);
    }

    #[test]
    fn test_unknown_kind_rejected_before_registration() {
        let (mut tree, _) = tree_with_root_log();
        let mut element = container(1).child(container(2));
        element.children[0].kind = "marquee".into();

        let err = tree.append_to_root(element).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Invariant(InvariantViolation::UnknownKind(_))
        ));
        assert!(tree.is_empty());
        assert!(tree.root_ids().is_empty());
    }

    #[test]
    fn test_remove_child_deregisters_descendants() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1).child(container(2).child(container(3).child(container(4)))))
            .unwrap();
        watch(&mut tree, 1, &log);
        watch(&mut tree, 3, &log);

        tree.remove_child(1, 2).unwrap();

        for id in [2, 3, 4] {
            assert!(!tree.contains(id));
        }
        assert!(!tree.has_render_fn(3));
        assert_bijection(&tree);

        assert!(matches!(
            tree.commit_text_update(3, "gone".into()),
            Err(BridgeError::State(StateError::NodeNotFound(3)))
        ));
    }

    #[test]
    fn test_remove_from_root() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(container(1).child(container(2))).unwrap();
        tree.append_to_root(container(3)).unwrap();
        log.lock().unwrap().clear();

        tree.remove_from_root(1).unwrap();

        assert_eq!(tree.root_ids(), &[3]);
        assert_eq!(tree.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["root:[3]"]);
        assert!(matches!(
            tree.remove_from_root(1),
            Err(BridgeError::State(StateError::NodeNotFound(1)))
        ));
    }

    #[test]
    fn test_commit_update_text_field_value_only() {
        let (mut tree, log) = tree_with_root_log();
        let field = Element::new(5, NodeKind::TextField)
            .prop("value", "")
            .style(style("red"));
        tree.append_to_root(field).unwrap();
        watch(&mut tree, 5, &log);
        log.lock().unwrap().clear();

        let diff = UpdateDiff::new().with_value("x").with_style(style("blue"));
        tree.commit_update(5, diff).unwrap();

        let node = tree.get(5).unwrap();
        assert_eq!(node.props()["value"], "x");
        assert_eq!(node.style(), Some(&style("red")));
        assert_eq!(*log.lock().unwrap(), vec!["node:5"]);
    }

    #[test]
    fn test_commit_update_ignores_unrelated_fields() {
        let cases = [
            (NodeKind::Container, UpdateDiff::new().with_value("v").with_fill("f")),
            (NodeKind::Text, UpdateDiff::new().with_route_name("r").with_src("s")),
            (NodeKind::Button, UpdateDiff::new().with_fill("f")),
            (NodeKind::Image, UpdateDiff::new().with_value("v").with_route_name("r")),
            (NodeKind::TextField, UpdateDiff::new().with_style(style("blue")).with_fill("f")),
            (NodeKind::NavAnimation, UpdateDiff::new().with_style(style("blue")).with_value("v")),
            (NodeKind::Path, UpdateDiff::new().with_style(style("blue")).with_src("s")),
        ];

        for (kind, diff) in cases {
            let (mut tree, log) = tree_with_root_log();
            tree.append_to_root(Element::new(1, kind).style(style("red")))
                .unwrap();
            watch(&mut tree, 1, &log);
            let before = tree.get(1).unwrap().clone();

            tree.commit_update(1, diff).unwrap();

            assert_eq!(tree.get(1).unwrap(), &before, "kind {} changed", kind);
        }
    }

    #[test]
    fn test_commit_update_kind_fields() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(Element::new(1, NodeKind::Image)).unwrap();
        tree.append_to_root(Element::new(2, NodeKind::NavAnimation))
            .unwrap();
        tree.append_to_root(Element::new(3, NodeKind::Path)).unwrap();
        for id in 1..=3 {
            watch(&mut tree, id, &log);
        }

        tree.commit_update(1, UpdateDiff::new().with_src("a.png").with_style(style("x")))
            .unwrap();
        tree.commit_update(2, UpdateDiff::new().with_route_name("home"))
            .unwrap();
        tree.commit_update(3, UpdateDiff::new().with_fill("#fff"))
            .unwrap();

        assert_eq!(tree.get(1).unwrap().props()["src"], "a.png");
        assert_eq!(tree.get(1).unwrap().style(), Some(&style("x")));
        assert_eq!(tree.get(2).unwrap().props()["routeName"], "home");
        assert_eq!(tree.get(3).unwrap().props()["fill"], "#fff");
    }

    #[test]
    fn test_commit_text_update() {
        let (mut tree, log) = tree_with_root_log();
        tree.append_to_root(Element::new(1, NodeKind::Text).text("old"))
            .unwrap();
        watch(&mut tree, 1, &log);

        tree.commit_text_update(1, "new".into()).unwrap();
        assert_eq!(tree.get(1).unwrap().text(), Some("new"));
        assert_eq!(tree.element(1).unwrap().text.as_deref(), Some("new"));
    }

    #[test]
    fn test_root_render_deferred_until_callback() {
        let mut tree = VirtualTree::new();
        tree.append_to_root(container(1)).unwrap();
        tree.append_to_root(container(2)).unwrap();

        let log: Log = Arc::default();
        let sink = log.clone();
        tree.on_render_root(Box::new(move |children: &[Element]| {
            sink.lock().unwrap().push(format!("{}", children.len()));
        }));

        assert_eq!(*log.lock().unwrap(), vec!["2"]);
    }

    #[test]
    fn test_render_receives_subtree() {
        let (mut tree, _) = tree_with_root_log();
        tree.append_to_root(container(1)).unwrap();

        let seen: Arc<Mutex<Option<Element>>> = Arc::default();
        let sink = seen.clone();
        tree.on_render(1, Box::new(move |element: &Element| *sink.lock().unwrap() = Some(element.clone())));
        tree.append_child(1, container(2).child(Element::new(3, NodeKind::Text).text("hi")))
            .unwrap();

        let element = seen.lock().unwrap().clone().unwrap();
        assert_eq!(element.children[0].id, 2);
        assert_eq!(element.children[0].children[0].text.as_deref(), Some("hi"));
    }
}
