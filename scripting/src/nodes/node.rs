use crate::nodes::traits::{ConstVisitable, NodeConstVisitor, NodeVisitor, Visitable};

#[derive(Default, Debug, Clone, PartialEq)]
pub struct NodeData {
    pub children: Vec<Node>,
}

#[derive(Default, Debug, Clone, PartialEq)]
pub struct VarData {
    pub name: String,
    pub index: Option<usize>,
}

/// Payload of a comparison node. `eps` is the smoothing width used under
/// fuzzy evaluation; negative means "no script-level override".
#[derive(Debug, Clone, PartialEq)]
pub struct CondData {
    pub children: Vec<Node>,
    pub eps: f64,
}

impl Default for CondData {
    fn default() -> Self {
        CondData {
            children: Vec::new(),
            eps: -1.0,
        }
    }
}

/// Payload of an `if` statement. `children[0]` is the condition; statements
/// `1..first_else` form the then-branch, `first_else..` the else-branch.
/// `affected_vars` is the write-set filled in by the if-processor.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct IfData {
    pub children: Vec<Node>,
    pub first_else: Option<usize>,
    pub affected_vars: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // leaves
    Const(f64),
    Var(VarData),
    Spot,

    // arithmetic
    Add(NodeData),
    Sub(NodeData),
    Mult(NodeData),
    Div(NodeData),
    Pow(NodeData),
    Uplus(NodeData),
    Uminus(NodeData),
    Log(NodeData),
    Sqrt(NodeData),
    Min(NodeData),
    Max(NodeData),
    Smooth(NodeData),
    List(NodeData),

    // conditions
    Equal(CondData),
    Sup(CondData),
    SupEqual(CondData),
    Not(NodeData),
    And(NodeData),
    Or(NodeData),

    // statements
    Assign(NodeData),
    Pays(NodeData),
    If(IfData),
    For(NodeData),
}

impl Node {
    pub fn new_const(value: f64) -> Node {
        Node::Const(value)
    }

    pub fn new_var(name: impl Into<String>) -> Node {
        Node::Var(VarData {
            name: name.into(),
            index: None,
        })
    }

    pub fn new_var_with_index(name: impl Into<String>, index: usize) -> Node {
        Node::Var(VarData {
            name: name.into(),
            index: Some(index),
        })
    }

    fn binary(lhs: Node, rhs: Node) -> NodeData {
        NodeData {
            children: vec![lhs, rhs],
        }
    }

    fn unary(child: Node) -> NodeData {
        NodeData {
            children: vec![child],
        }
    }

    pub fn new_add(lhs: Node, rhs: Node) -> Node {
        Node::Add(Self::binary(lhs, rhs))
    }

    pub fn new_sub(lhs: Node, rhs: Node) -> Node {
        Node::Sub(Self::binary(lhs, rhs))
    }

    pub fn new_mult(lhs: Node, rhs: Node) -> Node {
        Node::Mult(Self::binary(lhs, rhs))
    }

    pub fn new_div(lhs: Node, rhs: Node) -> Node {
        Node::Div(Self::binary(lhs, rhs))
    }

    pub fn new_pow(lhs: Node, rhs: Node) -> Node {
        Node::Pow(Self::binary(lhs, rhs))
    }

    pub fn new_uplus(child: Node) -> Node {
        Node::Uplus(Self::unary(child))
    }

    pub fn new_uminus(child: Node) -> Node {
        Node::Uminus(Self::unary(child))
    }

    pub fn new_equal(child: Node, eps: f64) -> Node {
        Node::Equal(CondData {
            children: vec![child],
            eps,
        })
    }

    pub fn new_sup(child: Node, eps: f64) -> Node {
        Node::Sup(CondData {
            children: vec![child],
            eps,
        })
    }

    pub fn new_sup_equal(child: Node, eps: f64) -> Node {
        Node::SupEqual(CondData {
            children: vec![child],
            eps,
        })
    }

    pub fn new_not(child: Node) -> Node {
        Node::Not(Self::unary(child))
    }

    pub fn new_and(lhs: Node, rhs: Node) -> Node {
        Node::And(Self::binary(lhs, rhs))
    }

    pub fn new_or(lhs: Node, rhs: Node) -> Node {
        Node::Or(Self::binary(lhs, rhs))
    }

    pub fn new_assign(var: Node, expr: Node) -> Node {
        Node::Assign(Self::binary(var, expr))
    }

    pub fn new_pays(var: Node, expr: Node) -> Node {
        Node::Pays(Self::binary(var, expr))
    }

    pub fn new_for(var: Node, iterable: Node, body: Vec<Node>) -> Node {
        let mut children = vec![var, iterable];
        children.extend(body);
        Node::For(NodeData { children })
    }

    /// Child expressions/statements, empty for leaves.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Const(_) | Node::Var(_) | Node::Spot => &[],
            Node::Add(data)
            | Node::Sub(data)
            | Node::Mult(data)
            | Node::Div(data)
            | Node::Pow(data)
            | Node::Uplus(data)
            | Node::Uminus(data)
            | Node::Log(data)
            | Node::Sqrt(data)
            | Node::Min(data)
            | Node::Max(data)
            | Node::Smooth(data)
            | Node::List(data)
            | Node::Not(data)
            | Node::And(data)
            | Node::Or(data)
            | Node::Assign(data)
            | Node::Pays(data)
            | Node::For(data) => &data.children,
            Node::Equal(data) | Node::Sup(data) | Node::SupEqual(data) => &data.children,
            Node::If(data) => &data.children,
        }
    }

    pub fn children_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Node::Const(_) => panic!("Cannot get children from constant node"),
            Node::Var(_) => panic!("Cannot get children from variable node"),
            Node::Spot => panic!("Cannot get children from spot node"),
            Node::Add(data)
            | Node::Sub(data)
            | Node::Mult(data)
            | Node::Div(data)
            | Node::Pow(data)
            | Node::Uplus(data)
            | Node::Uminus(data)
            | Node::Log(data)
            | Node::Sqrt(data)
            | Node::Min(data)
            | Node::Max(data)
            | Node::Smooth(data)
            | Node::List(data)
            | Node::Not(data)
            | Node::And(data)
            | Node::Or(data)
            | Node::Assign(data)
            | Node::Pays(data)
            | Node::For(data) => &mut data.children,
            Node::Equal(data) | Node::Sup(data) | Node::SupEqual(data) => &mut data.children,
            Node::If(data) => &mut data.children,
        }
    }

    pub fn add_child(&mut self, child: Node) {
        self.children_mut().push(child);
    }
}

impl Visitable for Node {
    fn accept<V: NodeVisitor>(&mut self, visitor: &V) -> V::Output {
        visitor.visit(self)
    }
}

impl ConstVisitable for Node {
    fn const_accept<V: NodeConstVisitor>(&self, visitor: &V) -> V::Output {
        visitor.const_visit(self)
    }
}
