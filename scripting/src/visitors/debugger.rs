use crate::nodes::node::{CondData, Node};
use crate::nodes::traits::NodeConstVisitor;

/// Serializes an AST back to script text. The output is normalized — every
/// binary expression is parenthesized and comparisons are printed from their
/// canonical against-zero form — and re-parses to an equal tree, which is
/// what the tests rely on.
pub struct Debugger;

impl Debugger {
    pub fn new() -> Self {
        Debugger
    }

    /// One line per statement.
    pub fn script(&self, statements: &[Node]) -> String {
        statements
            .iter()
            .map(|s| self.const_visit(s))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn expr(&self, node: &Node) -> String {
        match node {
            Node::Const(value) => format!("{}", value),
            Node::Var(data) => data.name.clone(),
            Node::Spot => "SPOT".to_string(),
            Node::Add(d) => format!("({} + {})", self.expr(&d.children[0]), self.expr(&d.children[1])),
            Node::Sub(d) => format!("({} - {})", self.expr(&d.children[0]), self.expr(&d.children[1])),
            Node::Mult(d) => format!("({} * {})", self.expr(&d.children[0]), self.expr(&d.children[1])),
            Node::Div(d) => format!("({} / {})", self.expr(&d.children[0]), self.expr(&d.children[1])),
            Node::Pow(d) => format!("({} ^ {})", self.expr(&d.children[0]), self.expr(&d.children[1])),
            Node::Uplus(d) => format!("(+{})", self.expr(&d.children[0])),
            Node::Uminus(d) => format!("(-{})", self.expr(&d.children[0])),
            Node::Log(d) => format!("LOG({})", self.expr(&d.children[0])),
            Node::Sqrt(d) => format!("SQRT({})", self.expr(&d.children[0])),
            Node::Min(d) => format!("MIN({})", self.args(&d.children)),
            Node::Max(d) => format!("MAX({})", self.args(&d.children)),
            Node::Smooth(d) => format!("SMOOTH({})", self.args(&d.children)),
            Node::List(d) => format!("[{}]", self.args(&d.children)),
            other => self.cond(other),
        }
    }

    fn args(&self, children: &[Node]) -> String {
        children
            .iter()
            .map(|c| self.expr(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Prints the comparison back in `lhs <cmp> rhs` form. The parser stores
    /// `lhs - rhs` as the single child, so the subtraction is unwrapped here.
    fn elementary(&self, data: &CondData, comparator: &str) -> String {
        let (lhs, rhs) = match data.children.first() {
            Some(Node::Sub(sub)) if sub.children.len() == 2 => {
                (self.expr(&sub.children[0]), self.expr(&sub.children[1]))
            }
            Some(other) => (self.expr(other), "0".to_string()),
            None => ("0".to_string(), "0".to_string()),
        };
        let eps = if data.eps >= 0.0 {
            format!(" ;{}", data.eps)
        } else {
            String::new()
        };
        format!("{} {} {}{}", lhs, comparator, rhs, eps)
    }

    fn cond(&self, node: &Node) -> String {
        match node {
            Node::Equal(data) => self.elementary(data, "="),
            Node::Sup(data) => self.elementary(data, ">"),
            Node::SupEqual(data) => self.elementary(data, ">="),
            Node::Not(d) => match d.children.first() {
                Some(Node::Equal(eq)) => self.elementary(eq, "!="),
                // `!` only wraps the equality built from `!=`
                Some(other) => format!("!({})", self.cond(other)),
                None => String::new(),
            },
            Node::And(d) => format!(
                "({}) AND ({})",
                self.cond(&d.children[0]),
                self.cond(&d.children[1])
            ),
            Node::Or(d) => format!(
                "({}) OR ({})",
                self.cond(&d.children[0]),
                self.cond(&d.children[1])
            ),
            other => self.expr(other),
        }
    }

    fn statements(&self, statements: &[Node]) -> String {
        statements
            .iter()
            .map(|s| self.const_visit(s))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl NodeConstVisitor for Debugger {
    type Output = String;

    fn const_visit(&self, node: &Node) -> String {
        match node {
            Node::Assign(d) => format!(
                "{} = {}",
                self.expr(&d.children[0]),
                self.expr(&d.children[1])
            ),
            Node::Pays(d) => format!(
                "{} PAYS {}",
                self.expr(&d.children[0]),
                self.expr(&d.children[1])
            ),
            Node::If(data) => {
                let last_then = data.first_else.unwrap_or(data.children.len());
                let mut out = format!(
                    "IF {} THEN {}",
                    self.cond(&data.children[0]),
                    self.statements(&data.children[1..last_then])
                );
                if let Some(first_else) = data.first_else {
                    out.push_str(&format!(
                        " ELSE {}",
                        self.statements(&data.children[first_else..])
                    ));
                }
                out.push_str(" ENDIF");
                out
            }
            Node::For(d) => format!(
                "FOR {} IN {} THEN {} ENDFOR",
                self.expr(&d.children[0]),
                self.expr(&d.children[1]),
                self.statements(&d.children[2..])
            ),
            other => self.expr(other),
        }
    }
}
