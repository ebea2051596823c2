use crate::nodes::node::Node;

/// Visitor that rewrites the tree in place (indexing, pre-processing).
pub trait NodeVisitor {
    type Output;
    fn visit(&self, node: &mut Node) -> Self::Output;
}

/// Read-only visitor (evaluation, serialization).
pub trait NodeConstVisitor {
    type Output;
    fn const_visit(&self, node: &Node) -> Self::Output;
}

pub trait Visitable {
    fn accept<V: NodeVisitor>(&mut self, visitor: &V) -> V::Output;
}

pub trait ConstVisitable {
    fn const_accept<V: NodeConstVisitor>(&self, visitor: &V) -> V::Output;
}
