//! Recursive-descent parser for the payoff language.
//!
//! Expressions climb through `+ -`, `* /`, `^`, unary signs, parentheses and
//! leaves. Conditions climb through `OR`, `AND` and elementary comparisons,
//! which are canonicalized against zero: `a < b` becomes `Sup(b - a)`,
//! `a != b` becomes `Not(Equal(a - b))`, and so on, so the evaluators only
//! ever see the three comparison kinds.

use crate::nodes::node::{IfData, Node, NodeData};
use crate::parsing::lexer::Token;
use crate::utils::errors::{Result, ScriptingError};

const KEYWORDS: &[&str] = &[
    "IF", "THEN", "ELSE", "ENDIF", "FOR", "IN", "ENDFOR", "PAYS", "AND", "OR", "SPOT", "LOG",
    "SQRT", "MIN", "MAX", "SMOOTH",
];

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

    /// Parse the token stream as a list of statements.
    pub fn parse(mut self) -> Result<Vec<Node>> {
        let mut statements = Vec::new();
        while !self.at_end() {
            if matches!(self.peek(), Some(Token::Semicolon)) {
                self.bump();
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(statements)
    }

    /* ── cursor helpers ─────────────────────────────────────────────── */

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn peek_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(w)) if w == word)
    }

    fn end_of(context: &str) -> ScriptingError {
        ScriptingError::Syntax(format!("Unexpected end of {}", context))
    }

    /* ── statements ─────────────────────────────────────────────────── */

    fn parse_statement(&mut self) -> Result<Node> {
        if self.peek_keyword("IF") {
            return self.parse_if();
        }
        if self.peek_keyword("FOR") {
            return self.parse_for();
        }

        let lhs = self.parse_var()?;
        match self.peek() {
            Some(Token::Eq) => {
                self.bump();
                let rhs = self.parse_expr()?;
                Ok(Node::new_assign(lhs, rhs))
            }
            Some(Token::Ident(w)) if w == "PAYS" => {
                self.bump();
                let rhs = self.parse_expr()?;
                Ok(Node::new_pays(lhs, rhs))
            }
            Some(t) => Err(ScriptingError::Unexpected(format!(
                "statement without an instruction near '{}'",
                t
            ))),
            None => Err(Self::end_of("statement")),
        }
    }

    /// Statements of an `if`/`for` body, up to one of `terminators`. Stray
    /// `;` separators are skipped.
    fn parse_block(&mut self, terminators: &[&str], context: &str) -> Result<Vec<Node>> {
        let mut statements = Vec::new();
        loop {
            match self.peek() {
                None => return Err(Self::end_of(context)),
                Some(Token::Semicolon) => self.bump(),
                Some(Token::Ident(w)) if terminators.contains(&w.as_str()) => {
                    return Ok(statements)
                }
                Some(_) => statements.push(self.parse_statement()?),
            }
        }
    }

    fn parse_if(&mut self) -> Result<Node> {
        self.bump(); // over IF
        let condition = self.parse_cond()?;

        if !self.peek_keyword("THEN") {
            return Err(ScriptingError::Syntax(
                "'if' is not followed by 'then'".to_string(),
            ));
        }
        self.bump();

        let statements = self.parse_block(&["ELSE", "ENDIF"], "'if' block")?;

        let mut children = vec![condition];
        children.extend(statements);

        let mut first_else = None;
        if self.peek_keyword("ELSE") {
            self.bump();
            let else_statements = self.parse_block(&["ENDIF"], "'else' block")?;
            first_else = Some(children.len());
            children.extend(else_statements);
        }

        self.bump(); // over ENDIF
        Ok(Node::If(IfData {
            children,
            first_else,
            affected_vars: Vec::new(),
        }))
    }

    fn parse_for(&mut self) -> Result<Node> {
        self.bump(); // over FOR
        let var = self.parse_var()?;

        if !self.peek_keyword("IN") {
            return Err(ScriptingError::Syntax(
                "'for' must be followed by 'in'".to_string(),
            ));
        }
        self.bump();
        let iterable = self.parse_expr()?;

        if !self.peek_keyword("THEN") {
            return Err(ScriptingError::Syntax(
                "'for' is not followed by 'then'".to_string(),
            ));
        }
        self.bump();

        let body = self.parse_block(&["ENDFOR"], "'for' block")?;
        self.bump(); // over ENDFOR
        Ok(Node::new_for(var, iterable, body))
    }

    /* ── expressions ────────────────────────────────────────────────── */

    fn parse_expr(&mut self) -> Result<Node> {
        let mut lhs = self.parse_expr_l2()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.bump();
                    let rhs = self.parse_expr_l2()?;
                    lhs = Node::new_add(lhs, rhs);
                }
                Some(Token::Minus) => {
                    self.bump();
                    let rhs = self.parse_expr_l2()?;
                    lhs = Node::new_sub(lhs, rhs);
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_expr_l2(&mut self) -> Result<Node> {
        let mut lhs = self.parse_expr_l3()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.bump();
                    let rhs = self.parse_expr_l3()?;
                    lhs = Node::new_mult(lhs, rhs);
                }
                Some(Token::Slash) => {
                    self.bump();
                    let rhs = self.parse_expr_l3()?;
                    lhs = Node::new_div(lhs, rhs);
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn parse_expr_l3(&mut self) -> Result<Node> {
        let mut lhs = self.parse_expr_l4()?;
        while matches!(self.peek(), Some(Token::Caret)) {
            self.bump();
            let rhs = self.parse_expr_l4()?;
            lhs = Node::new_pow(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_expr_l4(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Plus) => {
                self.bump();
                Ok(Node::new_uplus(self.parse_expr_l4()?))
            }
            Some(Token::Minus) => {
                self.bump();
                Ok(Node::new_uminus(self.parse_expr_l4()?))
            }
            _ => self.parse_expr_l5(),
        }
    }

    fn parse_expr_l5(&mut self) -> Result<Node> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.bump();
            let expr = self.parse_expr()?;
            if !matches!(self.peek(), Some(Token::RParen)) {
                return Err(ScriptingError::Syntax(
                    "Opening ( has no matching closing )".to_string(),
                ));
            }
            self.bump();
            Ok(expr)
        } else {
            self.parse_leaf()
        }
    }

    fn parse_leaf(&mut self) -> Result<Node> {
        match self.peek().cloned() {
            Some(Token::Num(value)) => {
                self.bump();
                Ok(Node::new_const(value))
            }
            Some(Token::LBracket) => self.parse_list(),
            Some(Token::Ident(name)) => match name.as_str() {
                "SPOT" => {
                    self.bump();
                    // the spot fixing takes no arguments; parentheses optional
                    if matches!(self.peek(), Some(Token::LParen)) {
                        let args = self.parse_func_args()?;
                        if !args.is_empty() {
                            return Err(ScriptingError::Arity {
                                name: "SPOT".to_string(),
                                min: 0,
                                max: 0,
                                got: args.len(),
                            });
                        }
                    }
                    Ok(Node::Spot)
                }
                "LOG" => self.parse_builtin(&name, 1, 1, Node::Log),
                "SQRT" => self.parse_builtin(&name, 1, 1, Node::Sqrt),
                "MIN" => self.parse_builtin(&name, 2, 100, Node::Min),
                "MAX" => self.parse_builtin(&name, 2, 100, Node::Max),
                "SMOOTH" => self.parse_builtin(&name, 4, 4, Node::Smooth),
                _ => self.parse_var(),
            },
            Some(t) => Err(ScriptingError::Unexpected(t.to_string())),
            None => Err(Self::end_of("expression")),
        }
    }

    fn parse_builtin(
        &mut self,
        name: &str,
        min_args: usize,
        max_args: usize,
        build: impl FnOnce(NodeData) -> Node,
    ) -> Result<Node> {
        self.bump(); // over the function name
        let args = self.parse_func_args()?;
        if args.len() < min_args || args.len() > max_args {
            return Err(ScriptingError::Arity {
                name: name.to_string(),
                min: min_args,
                max: max_args,
                got: args.len(),
            });
        }
        Ok(build(NodeData { children: args }))
    }

    fn parse_func_args(&mut self) -> Result<Vec<Node>> {
        if !matches!(self.peek(), Some(Token::LParen)) {
            return Err(ScriptingError::Syntax(
                "No opening ( following function name".to_string(),
            ));
        }
        self.bump();
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.peek() {
                Some(Token::Comma) => self.bump(),
                Some(Token::RParen) => {
                    self.bump();
                    return Ok(args);
                }
                Some(_) => {
                    return Err(ScriptingError::Syntax(
                        "Arguments must be separated by commas".to_string(),
                    ))
                }
                None => {
                    return Err(ScriptingError::Syntax(
                        "Opening ( has no matching closing )".to_string(),
                    ))
                }
            }
        }
    }

    fn parse_list(&mut self) -> Result<Node> {
        self.bump(); // over '['
        let mut values = Vec::new();
        loop {
            match self.peek() {
                Some(Token::RBracket) => {
                    self.bump();
                    return Ok(Node::List(NodeData { children: values }));
                }
                None => {
                    return Err(ScriptingError::Syntax(
                        "Opening [ has no matching closing ]".to_string(),
                    ))
                }
                _ => {
                    values.push(self.parse_expr()?);
                    match self.peek() {
                        Some(Token::Comma) => self.bump(),
                        Some(Token::RBracket) => {}
                        Some(_) => {
                            return Err(ScriptingError::Syntax(
                                "List elements must be separated by commas".to_string(),
                            ))
                        }
                        None => {
                            return Err(ScriptingError::Syntax(
                                "Opening [ has no matching closing ]".to_string(),
                            ))
                        }
                    }
                }
            }
        }
    }

    fn parse_var(&mut self) -> Result<Node> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                if KEYWORDS.contains(&name.as_str()) {
                    return Err(ScriptingError::Syntax(format!(
                        "Variable name {} is reserved",
                        name
                    )));
                }
                self.bump();
                Ok(Node::new_var(name))
            }
            Some(t) => Err(ScriptingError::Syntax(format!(
                "Variable name {} is invalid",
                t
            ))),
            None => Err(Self::end_of("statement")),
        }
    }

    /* ── conditions ─────────────────────────────────────────────────── */

    fn parse_cond(&mut self) -> Result<Node> {
        let mut lhs = self.parse_cond_l2()?;
        while self.peek_keyword("OR") {
            self.bump();
            let rhs = self.parse_cond_l2()?;
            lhs = Node::new_or(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cond_l2(&mut self) -> Result<Node> {
        let mut lhs = self.parse_cond_parens()?;
        while self.peek_keyword("AND") {
            self.bump();
            let rhs = self.parse_cond_parens()?;
            lhs = Node::new_and(lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_cond_parens(&mut self) -> Result<Node> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.bump();
            let cond = self.parse_cond()?;
            if !matches!(self.peek(), Some(Token::RParen)) {
                return Err(ScriptingError::Syntax(
                    "Opening ( has no matching closing )".to_string(),
                ));
            }
            self.bump();
            Ok(cond)
        } else {
            self.parse_cond_elem()
        }
    }

    fn parse_cond_elem(&mut self) -> Result<Node> {
        let lhs = self.parse_expr()?;
        let comparator = match self.peek() {
            Some(
                t @ (Token::Eq | Token::Neq | Token::Lt | Token::Gt | Token::Leq | Token::Geq),
            ) => t.clone(),
            Some(t) => {
                return Err(ScriptingError::Syntax(format!(
                    "Elementary condition has no valid comparator, got '{}'",
                    t
                )))
            }
            None => return Err(Self::end_of("condition")),
        };
        self.bump();
        let rhs = self.parse_expr()?;
        let eps = self.parse_cond_optionals()?;

        Ok(match comparator {
            Token::Eq => Node::new_equal(Node::new_sub(lhs, rhs), eps),
            Token::Neq => Node::new_not(Node::new_equal(Node::new_sub(lhs, rhs), eps)),
            Token::Lt => Node::new_sup(Node::new_sub(rhs, lhs), eps),
            Token::Gt => Node::new_sup(Node::new_sub(lhs, rhs), eps),
            Token::Leq => Node::new_sup_equal(Node::new_sub(rhs, lhs), eps),
            Token::Geq => Node::new_sup_equal(Node::new_sub(lhs, rhs), eps),
            _ => unreachable!(),
        })
    }

    /// Optional `;eps` / `:eps` smoothing width after an elementary
    /// condition. Defaults to -1, meaning no script-level override.
    fn parse_cond_optionals(&mut self) -> Result<f64> {
        let mut eps = -1.0;
        while matches!(self.peek(), Some(Token::Semicolon | Token::Colon)) {
            self.bump();
            match self.peek().cloned() {
                Some(Token::Num(value)) => {
                    self.bump();
                    eps = value;
                }
                Some(t) => {
                    return Err(ScriptingError::Syntax(format!(
                        "smoothing width must be a number, got '{}'",
                        t
                    )))
                }
                None => return Err(Self::end_of("condition")),
            }
        }
        Ok(eps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::node::VarData;
    use crate::parsing::lexer::Lexer;

    fn parse(script: &str) -> Result<Vec<Node>> {
        Parser::new(Lexer::new(script).tokenize()?).parse()
    }

    fn var(name: &str) -> Node {
        Node::Var(VarData {
            name: name.to_string(),
            index: None,
        })
    }

    #[test]
    fn simple_assignment() {
        let nodes = parse("x = 3").unwrap();
        assert_eq!(nodes, vec![Node::new_assign(var("X"), Node::Const(3.0))]);
    }

    #[test]
    fn trailing_semicolon_is_a_separator() {
        let nodes = parse("value PAYS spot;").unwrap();
        assert_eq!(nodes, vec![Node::new_pays(var("VALUE"), Node::Spot)]);
    }

    #[test]
    fn precedence_climbing() {
        let nodes = parse("x = 2 + 3 * 4 ^ 2").unwrap();
        let expected = Node::new_add(
            Node::Const(2.0),
            Node::new_mult(
                Node::Const(3.0),
                Node::new_pow(Node::Const(4.0), Node::Const(2.0)),
            ),
        );
        assert_eq!(nodes, vec![Node::new_assign(var("X"), expected)]);
    }

    #[test]
    fn parentheses_override_precedence() {
        let nodes = parse("x = (2 + 3) * 4").unwrap();
        let expected = Node::new_mult(
            Node::new_add(Node::Const(2.0), Node::Const(3.0)),
            Node::Const(4.0),
        );
        assert_eq!(nodes, vec![Node::new_assign(var("X"), expected)]);
    }

    #[test]
    fn unary_signs_stack() {
        let nodes = parse("x = --3").unwrap();
        let expected = Node::new_uminus(Node::new_uminus(Node::Const(3.0)));
        assert_eq!(nodes, vec![Node::new_assign(var("X"), expected)]);
    }

    #[test]
    fn comparisons_canonicalize_against_zero() {
        let nodes = parse("if x < 100 then y = 1 endif").unwrap();
        let cond = Node::new_sup(Node::new_sub(Node::Const(100.0), var("X")), -1.0);
        match &nodes[0] {
            Node::If(data) => {
                assert_eq!(data.children[0], cond);
                assert_eq!(data.first_else, None);
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn not_equal_wraps_equal() {
        let nodes = parse("if x != 0 then y = 1 endif").unwrap();
        let cond = Node::new_not(Node::new_equal(
            Node::new_sub(var("X"), Node::Const(0.0)),
            -1.0,
        ));
        match &nodes[0] {
            Node::If(data) => assert_eq!(data.children[0], cond),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn eps_annotation_lands_on_the_comparison() {
        let nodes = parse("if spot > 100 ;0.5 then y = 1 endif").unwrap();
        match &nodes[0] {
            Node::If(data) => match &data.children[0] {
                Node::Sup(cond) => assert_eq!(cond.eps, 0.5),
                other => panic!("expected sup, got {:?}", other),
            },
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn if_else_records_first_else() {
        let nodes = parse("if x > 0 then y = 1 z = 2 else y = 3 endif").unwrap();
        match &nodes[0] {
            Node::If(data) => {
                assert_eq!(data.children.len(), 4);
                assert_eq!(data.first_else, Some(3));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn and_or_precedence() {
        let nodes = parse("if x > 0 and y > 0 or z > 0 then w = 1 endif").unwrap();
        match &nodes[0] {
            Node::If(data) => match &data.children[0] {
                Node::Or(or) => {
                    assert!(matches!(or.children[0], Node::And(_)));
                    assert!(matches!(or.children[1], Node::Sup(_)));
                }
                other => panic!("expected or, got {:?}", other),
            },
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn for_loop_layout() {
        let nodes = parse("for i in [1, 2, 3] then x = x + i endfor").unwrap();
        match &nodes[0] {
            Node::For(data) => {
                assert_eq!(data.children[0], var("I"));
                assert!(matches!(data.children[1], Node::List(_)));
                assert_eq!(data.children.len(), 3);
            }
            other => panic!("expected for, got {:?}", other),
        }
    }

    #[test]
    fn spot_parses_with_and_without_parentheses() {
        assert_eq!(parse("x = spot").unwrap(), parse("x = SPOT()").unwrap());
    }

    #[test]
    fn builtin_arity_is_checked() {
        assert!(parse("x = log(1, 2)").is_err());
        assert!(parse("x = min(1)").is_err());
        assert!(parse("x = smooth(1, 2, 3)").is_err());
        assert!(parse("x = max(1, 2, 3)").is_ok());
    }

    #[test]
    fn unbalanced_parentheses_fail() {
        assert!(parse("x = (1 + 2").is_err());
        assert!(parse("x = [1, 2").is_err());
    }

    #[test]
    fn operator_without_rhs_fails() {
        assert!(parse("x = 1 +").is_err());
        assert!(parse("x =").is_err());
    }

    #[test]
    fn missing_then_or_endif_fails() {
        assert!(parse("if x > 0 y = 1 endif").is_err());
        assert!(parse("if x > 0 then y = 1").is_err());
    }

    #[test]
    fn statement_needs_an_instruction() {
        assert!(parse("x 3").is_err());
        assert!(parse("3 = x").is_err());
    }
}
