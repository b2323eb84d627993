//! The parser: recursive descent over the token stream into the AST.

use std::fmt::Debug;

use derive_more::derive::Display;

use super::ast::*;
use super::lex::*;
use crate::common::{intern, Line};

#[derive(Display)]
#[display("Parse error: {_0}")]
pub struct ParseError(String);

impl Debug for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self}")
    }
}

fn err<T>(msg: impl Into<String>) -> Result<T, ParseError> {
    Err(ParseError(msg.into()))
}

struct Parser<'src> {
    toks: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<Token<'src>> {
        self.toks.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn line(&self) -> Line {
        self.peek()
            .map(|t| t.line)
            .or_else(|| self.toks.last().map(|t| t.line))
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Option<Token<'src>> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.peek() {
            Some(t) if t.kind == kind => {
                self.pos += 1;
                Ok(t)
            }
            Some(t) => err(format!(
                "line {}: expected {kind}, found {} '{}'",
                t.line, t.kind, t.text
            )),
            None => err(format!("expected {kind}, found end of input")),
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut items = vec![];
        while self.peek().is_some() {
            items.push(self.parse_item()?);
        }
        Ok(Program { items })
    }

    fn parse_base_type(&mut self) -> Result<BaseType, ParseError> {
        if self.eat(TokenKind::Int) {
            Ok(BaseType::Int)
        } else if self.eat(TokenKind::Void) {
            Ok(BaseType::Void)
        } else {
            err(format!("line {}: expected a type", self.line()))
        }
    }

    /// An item is either a variable declaration or a function definition;
    /// both start with a base type and a name, so look ahead past the
    /// first identifier to decide which.
    fn parse_item(&mut self) -> Result<Item, ParseError> {
        let base_type = self.parse_base_type()?;
        let name_tok = self.expect(TokenKind::Id)?;
        let name = intern(name_tok.text);
        if self.peek_kind() == Some(TokenKind::LParen) {
            Ok(Item::FuncDef(self.parse_func_def_tail(base_type, name, name_tok.line)?))
        } else {
            let decl = self.parse_var_decl_tail(base_type, name, name_tok.line)?;
            self.expect(TokenKind::Semi)?;
            Ok(Item::VarDecl(decl))
        }
    }

    fn parse_func_def_tail(
        &mut self,
        ret_type: BaseType,
        name: crate::common::Id,
        line: Line,
    ) -> Result<FuncDef, ParseError> {
        self.expect(TokenKind::LParen)?;
        let mut params = vec![];
        if self.peek_kind() != Some(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(FuncDef {
            ret_type,
            name,
            params,
            body,
            line,
        })
    }

    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let base_type = self.parse_base_type()?;
        let tok = self.expect(TokenKind::Id)?;
        let mut dims = vec![];
        while self.eat(TokenKind::LBracket) {
            if self.peek_kind() == Some(TokenKind::RBracket) {
                dims.push(None);
            } else {
                dims.push(Some(self.parse_expr()?));
            }
            self.expect(TokenKind::RBracket)?;
        }
        Ok(Param {
            base_type,
            name: intern(tok.text),
            dims,
            line: tok.line,
        })
    }

    /// Parses one declaration's worth of declarators after the base type
    /// and first identifier have already been consumed.
    fn parse_var_decl_tail(
        &mut self,
        base_type: BaseType,
        first_name: crate::common::Id,
        first_line: Line,
    ) -> Result<VarDecl, ParseError> {
        let mut declarators = vec![self.parse_declarator_tail(first_name, first_line)?];
        while self.eat(TokenKind::Comma) {
            let tok = self.expect(TokenKind::Id)?;
            declarators.push(self.parse_declarator_tail(intern(tok.text), tok.line)?);
        }
        Ok(VarDecl { base_type, declarators })
    }

    fn parse_declarator_tail(
        &mut self,
        name: crate::common::Id,
        line: Line,
    ) -> Result<Declarator, ParseError> {
        let mut dims = vec![];
        while self.eat(TokenKind::LBracket) {
            dims.push(self.parse_expr()?);
            self.expect(TokenKind::RBracket)?;
        }
        let init = if self.eat(TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(Declarator { name, dims, init, line })
    }

    fn parse_block(&mut self) -> Result<Block, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = vec![];
        while self.peek_kind() != Some(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(Block { stmts })
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::LBrace) => Ok(Stmt::Block(self.parse_block()?)),
            Some(TokenKind::Semi) => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Some(TokenKind::Int) | Some(TokenKind::Void) => {
                let decl = self.parse_var_decl()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::VarDecl(decl))
            }
            Some(TokenKind::If) => self.parse_if(),
            Some(TokenKind::While) => self.parse_while(),
            Some(TokenKind::Break) => {
                let line = self.advance().unwrap().line;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Break(line))
            }
            Some(TokenKind::Continue) => {
                let line = self.advance().unwrap().line;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Continue(line))
            }
            Some(TokenKind::Return) => {
                let line = self.advance().unwrap().line;
                let value = if self.peek_kind() == Some(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return { value, line })
            }
            _ => self.parse_assign_or_expr_stmt(),
        }
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, ParseError> {
        let base_type = self.parse_base_type()?;
        let tok = self.expect(TokenKind::Id)?;
        self.parse_var_decl_tail(base_type, intern(tok.text), tok.line)
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let then_branch = Box::new(self.parse_stmt()?);
        let else_branch = if self.eat(TokenKind::Else) {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        self.expect(TokenKind::While)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::RParen)?;
        let body = Box::new(self.parse_stmt()?);
        Ok(Stmt::While { cond, body })
    }

    fn parse_assign_or_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.line();
        let first = self.parse_expr()?;
        let stmt = if self.eat(TokenKind::Assign) {
            let value = self.parse_expr()?;
            Stmt::Assign {
                target: first,
                value,
                line,
            }
        } else {
            Stmt::Expr(first)
        };
        self.expect(TokenKind::Semi)?;
        Ok(stmt)
    }

    // Expr ::= Or
    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_and()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary {
                op: BOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_rel()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.parse_rel()?;
            lhs = Expr::Binary {
                op: BOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_rel(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => BOp::Eq,
                Some(TokenKind::NotEq) => BOp::Ne,
                Some(TokenKind::Lt) => BOp::Lt,
                Some(TokenKind::Le) => BOp::Le,
                Some(TokenKind::Gt) => BOp::Gt,
                Some(TokenKind::Ge) => BOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_add()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BOp::Add,
                Some(TokenKind::Minus) => BOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BOp::Mul,
                Some(TokenKind::Div) => BOp::Div,
                Some(TokenKind::Percent) => BOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(TokenKind::Minus) {
            Ok(Expr::Neg(Box::new(self.parse_unary()?)))
        } else if self.eat(TokenKind::Not) {
            Ok(Expr::Not(Box::new(self.parse_unary()?)))
        } else if self.eat(TokenKind::Plus) {
            self.parse_unary()
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let primary_line = self.line();
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(TokenKind::LBracket) {
                let mut indices = vec![self.parse_expr()?];
                self.expect(TokenKind::RBracket)?;
                while self.eat(TokenKind::LBracket) {
                    indices.push(self.parse_expr()?);
                    self.expect(TokenKind::RBracket)?;
                }
                expr = Expr::Index {
                    base: Box::new(expr),
                    indices,
                    line: primary_line,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        match self.peek_kind() {
            Some(TokenKind::Num) => {
                let t = self.advance().unwrap();
                let v: i64 = t
                    .text
                    .parse()
                    .map_err(|_| ParseError(format!("line {line}: bad integer literal '{}'", t.text)))?;
                Ok(Expr::IntLit(v as i32))
            }
            Some(TokenKind::Id) => {
                let t = self.advance().unwrap();
                let name = intern(t.text);
                if self.peek_kind() == Some(TokenKind::LParen) {
                    self.advance();
                    let mut args = vec![];
                    if self.peek_kind() != Some(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::Call { name, args, line })
                } else {
                    Ok(Expr::Var(name, line))
                }
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let e = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            Some(k) => err(format!("line {line}: unexpected token {k}")),
            None => err("unexpected end of input"),
        }
    }
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let toks = Lexer::new(input).tokenize().map_err(|e| ParseError(e.to_string()))?;
    let mut parser = Parser { toks, pos: 0 };
    parser.parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_main() {
        let prog = parse("int main() { return 1 + 2 * 3; }").unwrap();
        assert_eq!(prog.items.len(), 1);
        assert!(matches!(prog.items[0], Item::FuncDef(_)));
    }

    #[test]
    fn parses_multi_declarators() {
        let prog = parse("int main() { int a = 10, b = 3; return a % b; }").unwrap();
        let Item::FuncDef(f) = &prog.items[0] else {
            panic!()
        };
        assert_eq!(f.body.stmts.len(), 2);
    }

    #[test]
    fn parses_array_declaration_and_index() {
        let prog = parse("int main() { int a[2][3]; a[1][2] = 7; return a[1][2]; }").unwrap();
        let Item::FuncDef(f) = &prog.items[0] else {
            panic!()
        };
        assert_eq!(f.body.stmts.len(), 3);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("int main() { return 1 + ; }").is_err());
    }
}
