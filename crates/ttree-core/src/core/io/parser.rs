use super::IoError;
use super::lexer::{LexError, Lexer, Token};
use crate::core::models::command::Side;
use crate::core::models::definition::{
    ArrayDim, BaseRef, DefCommand, DefinitionTree, Instantiation,
};
use crate::core::models::ids::DefId;
use crate::core::models::template::{SrcLoc, VarKind, VarRef};
use crate::core::models::transform::{TransformChain, TransformError};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Io(#[from] IoError),
}

const KEYWORDS: &[&str] = &[
    "write",
    "write_once",
    "create_var",
    "category",
    "assign",
    "delete",
    "push",
    "pushleft",
    "pushright",
    "pop",
    "popleft",
    "popright",
    "new",
    "inherits",
];

#[instrument(skip_all, name = "parse_file")]
pub fn parse_file(path: &Path, search_path: &[PathBuf]) -> Result<DefinitionTree, ParseError> {
    let lexer = Lexer::from_file(path)?.with_search_path(search_path.to_vec());
    Parser::new(lexer, SrcLoc::new(path.display().to_string(), 1)).run()
}

pub fn parse_str(
    name: &str,
    text: &str,
    search_path: &[PathBuf],
) -> Result<DefinitionTree, ParseError> {
    let lexer = Lexer::from_text(name, text).with_search_path(search_path.to_vec());
    Parser::new(lexer, SrcLoc::new(name, 1)).run()
}

struct Parser {
    lexer: Lexer,
    defs: DefinitionTree,
    peeked: Option<Token>,
}

impl Parser {
    fn new(lexer: Lexer, loc: SrcLoc) -> Self {
        Self {
            lexer,
            defs: DefinitionTree::new(loc),
            peeked: None,
        }
    }

    fn run(mut self) -> Result<DefinitionTree, ParseError> {
        let root = self.defs.root();
        self.parse_body(root, None)?;
        debug!(definitions = self.defs.len(), "Parsed definition tree.");
        Ok(self.defs)
    }

    fn next(&mut self) -> Result<Option<Token>, ParseError> {
        match self.peeked.take() {
            Some(tok) => Ok(Some(tok)),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>, ParseError> {
        if self.peeked.is_none() {
            self.peeked = self.lexer.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn next_required(&mut self, expected: &'static str) -> Result<Token, ParseError> {
        let loc = self.lexer.loc();
        self.next()?
            .ok_or_else(|| LexError::UnexpectedEof { loc, expected }.into())
    }

    fn expect(&mut self, text: &'static str) -> Result<Token, ParseError> {
        let tok = self.next_required(text)?;
        if tok.is(text) {
            Ok(tok)
        } else {
            Err(unexpected(&tok, text))
        }
    }

    /// Parses statements into `def` until the closing brace (when `open` carries
    /// the location of the opening one) or the end of input.
    fn parse_body(&mut self, def: DefId, open: Option<&SrcLoc>) -> Result<(), ParseError> {
        loop {
            let Some(tok) = self.next()? else {
                return match open {
                    Some(loc) => Err(LexError::UnexpectedEof {
                        loc: loc.clone(),
                        expected: "a closing \"}\"",
                    }
                    .into()),
                    None => Ok(()),
                };
            };
            if tok.quoted {
                return Err(unexpected(&tok, "a statement"));
            }
            match tok.text.as_str() {
                "}" if open.is_some() => return Ok(()),
                "write" | "write_once" => self.parse_write(def, tok)?,
                "create_var" => self.parse_create_var(def, tok)?,
                "category" => self.parse_category(def, tok)?,
                "assign" => self.parse_assign(def, tok)?,
                "delete" => {
                    let target = self.next_required("an instance name")?;
                    self.push_command(
                        def,
                        DefCommand::Delete {
                            target: target.text,
                            loc: tok.loc,
                        },
                    );
                }
                "push" | "pushleft" | "pushright" => self.parse_push(def, tok)?,
                "pop" | "popleft" | "popright" => {
                    let side = side_of(&tok.text);
                    self.expect("(")?;
                    self.lexer.read_until_close_paren()?;
                    self.push_command(def, DefCommand::Pop { side, loc: tok.loc });
                }
                "new" => self.parse_new(def, None, tok.loc)?,
                _ => self.parse_named(def, tok)?,
            }
        }
    }

    fn push_command(&mut self, def: DefId, command: DefCommand) {
        if let Some(node) = self.defs.get_mut(def) {
            node.commands.push(command);
        }
    }

    /// `Name { ... }`, `Name inherits A B { ... }` or `name = new ...`.
    fn parse_named(&mut self, def: DefId, name: Token) -> Result<(), ParseError> {
        if is_punctuation(&name.text) || KEYWORDS.contains(&name.text.as_str()) {
            return Err(unexpected(&name, "a statement"));
        }
        let next = self.next_required("\"=\", \"{\" or \"inherits\"")?;
        match next.text.as_str() {
            "=" => {
                self.expect("new")?;
                self.parse_new(def, Some(name.text), name.loc)
            }
            "{" | "inherits" => {
                let class = self.defs.open_class(def, &name.text, name.loc.clone());
                if next.is("inherits") {
                    loop {
                        let base = self.next_required("a base class or \"{\"")?;
                        if base.is("{") {
                            break;
                        }
                        if is_punctuation(&base.text) {
                            return Err(unexpected(&base, "a base class or \"{\""));
                        }
                        if let Some(node) = self.defs.get_mut(class) {
                            node.bases.push(BaseRef {
                                class: base.text,
                                loc: base.loc,
                            });
                        }
                    }
                }
                self.parse_body(class, Some(&name.loc))
            }
            _ => Err(unexpected(&next, "\"=\", \"{\" or \"inherits\"")),
        }
    }

    fn parse_new(
        &mut self,
        def: DefId,
        name: Option<String>,
        loc: SrcLoc,
    ) -> Result<(), ParseError> {
        debug_assert!(self.peeked.is_none());
        let (expr, expr_loc) = self.lexer.read_instance_expr()?;
        let (class, chain, dims) = parse_instance_expr(&expr, &expr_loc)?;

        let has_body = self.peek()?.is_some_and(|t| t.is("{"));
        let body = if has_body {
            self.next()?;
            let label = name.clone().unwrap_or_else(|| class.clone());
            let body = self.defs.add_instance_body(def, &label, loc.clone());
            self.parse_body(body, Some(&loc))?;
            Some(body)
        } else {
            None
        };

        self.push_command(
            def,
            DefCommand::Instantiate(Instantiation {
                name,
                class,
                chain,
                dims,
                body,
                loc,
            }),
        );
        Ok(())
    }

    fn parse_write(&mut self, def: DefId, tok: Token) -> Result<(), ParseError> {
        self.expect("(")?;
        let channel = self.next_required("a file name")?;
        self.expect(")")?;
        let open = self.expect("{")?;
        let (template, terminator) = self.lexer.read_template("}")?;
        if terminator.is_none() {
            return Err(LexError::UnexpectedEof {
                loc: open.loc,
                expected: "a closing \"}\" after the template",
            }
            .into());
        }
        self.push_command(
            def,
            DefCommand::Write {
                channel: channel.text,
                once: tok.text == "write_once",
                template,
                loc: tok.loc,
            },
        );
        Ok(())
    }

    fn parse_create_var(&mut self, def: DefId, tok: Token) -> Result<(), ParseError> {
        let open = self.expect("{")?;
        let (template, terminator) = self.lexer.read_template("}")?;
        if terminator.is_none() {
            return Err(LexError::UnexpectedEof {
                loc: open.loc,
                expected: "a closing \"}\"",
            }
            .into());
        }
        self.push_command(
            def,
            DefCommand::CreateVar {
                template,
                loc: tok.loc,
            },
        );
        Ok(())
    }

    /// `category $name(start,incr)`; the counter arguments are optional.
    fn parse_category(&mut self, def: DefId, tok: Token) -> Result<(), ParseError> {
        let var_tok = self.next_required("a category name")?;
        let var = var_ref_from_token(&var_tok)?;
        let (mut start, mut incr) = (1i64, 1i64);
        if self.peek()?.is_some_and(|t| t.is("(")) {
            self.next()?;
            let args = self.lexer.read_until_close_paren()?;
            let parsed: Result<Vec<i64>, _> =
                args.split(',').map(|a| a.trim().parse::<i64>()).collect();
            match parsed.as_deref() {
                Ok([s]) => start = *s,
                Ok([s, i]) => {
                    start = *s;
                    incr = *i;
                }
                _ => {
                    return Err(LexError::UnexpectedToken {
                        loc: var_tok.loc,
                        found: args,
                        expected: "\"(start)\" or \"(start,increment)\" integers",
                    }
                    .into());
                }
            }
        }
        self.push_command(
            def,
            DefCommand::Category {
                kind: var.kind(),
                name: var.descr,
                start,
                incr,
                loc: tok.loc,
            },
        );
        Ok(())
    }

    fn parse_assign(&mut self, def: DefId, tok: Token) -> Result<(), ParseError> {
        let var_tok = self.next_required("a variable")?;
        let var = var_ref_from_token(&var_tok)?;
        let value = self.next_required("a value")?;
        self.push_command(
            def,
            DefCommand::Assign {
                var,
                value: value.text,
                loc: tok.loc,
            },
        );
        Ok(())
    }

    fn parse_push(&mut self, def: DefId, tok: Token) -> Result<(), ParseError> {
        self.expect("(")?;
        let text = self.lexer.read_until_close_paren()?;
        let chain = TransformChain::parse(&text, &tok.loc)?;
        self.push_command(
            def,
            DefCommand::Push {
                side: side_of(&tok.text),
                chain,
                loc: tok.loc,
            },
        );
        Ok(())
    }
}

fn side_of(keyword: &str) -> Option<Side> {
    if keyword.ends_with("left") {
        Some(Side::Left)
    } else if keyword.ends_with("right") {
        Some(Side::Right)
    } else {
        None
    }
}

fn is_punctuation(text: &str) -> bool {
    text.len() == 1 && "(){}=|".contains(text)
}

fn unexpected(tok: &Token, expected: &'static str) -> ParseError {
    LexError::UnexpectedToken {
        loc: tok.loc.clone(),
        found: tok.text.clone(),
        expected,
    }
    .into()
}

/// Builds a variable reference from a whole token such as `$atom:C` or `@{bond:x}`.
fn var_ref_from_token(tok: &Token) -> Result<VarRef, LexError> {
    let mut chars = tok.text.chars();
    let delim = chars.next().filter(|&c| VarKind::from_delim(c).is_some());
    let Some(delim) = delim else {
        return Err(LexError::UnexpectedToken {
            loc: tok.loc.clone(),
            found: tok.text.clone(),
            expected: "a variable starting with \"$\" or \"@\"",
        });
    };
    let rest = chars.as_str();
    let (prefix, descr, suffix) = match rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        Some(inner) => (format!("{}{{", delim), inner, "}"),
        None => (delim.to_string(), rest, ""),
    };
    if descr.is_empty() {
        return Err(LexError::EmptyVariableName {
            loc: tok.loc.clone(),
        });
    }
    Ok(VarRef {
        prefix,
        descr: descr.to_string(),
        suffix: suffix.to_string(),
        modifier: None,
        loc: tok.loc.clone(),
        binding: None,
    })
}

/// Splits `Class.chain[N].step[M].step` into the class path, the base chain and
/// the array dimensions.
fn parse_instance_expr(
    expr: &str,
    loc: &SrcLoc,
) -> Result<(String, TransformChain, Vec<ArrayDim>), ParseError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '[' || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic())) {
            break;
        }
        i += 1;
    }
    let class: String = chars[..i].iter().collect();
    if class.is_empty() {
        return Err(LexError::UnexpectedToken {
            loc: loc.clone(),
            found: expr.to_string(),
            expected: "a class name",
        }
        .into());
    }

    let chain_end = next_bracket(&chars, i);
    let chain_text: String = chars[i..chain_end].iter().collect();
    let chain = TransformChain::parse(&chain_text, loc)?;
    i = chain_end;

    let mut dims = Vec::new();
    while i < chars.len() {
        let close = chars[i..]
            .iter()
            .position(|&c| c == ']')
            .map(|p| p + i)
            .ok_or_else(|| LexError::UnterminatedExpression { loc: loc.clone() })?;
        let count_text: String = chars[i + 1..close].iter().collect();
        let count = count_text
            .parse::<usize>()
            .map_err(|_| LexError::UnexpectedToken {
                loc: loc.clone(),
                found: count_text.clone(),
                expected: "a non-negative array size",
            })?;
        let step_end = next_bracket(&chars, close + 1);
        let step_text: String = chars[close + 1..step_end].iter().collect();
        dims.push(ArrayDim {
            count,
            step: TransformChain::parse(&step_text, loc)?,
        });
        i = step_end;
    }
    Ok((class, chain, dims))
}

/// Index of the next `[` outside parentheses, or the end of `chars`.
fn next_bracket(chars: &[char], from: usize) -> usize {
    let mut depth = 0usize;
    for (offset, &c) in chars[from..].iter().enumerate() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            '[' if depth == 0 => return from + offset,
            _ => {}
        }
    }
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::template::TemplateItem;

    fn parse(src: &str) -> DefinitionTree {
        parse_str("test.lt", src, &[]).unwrap()
    }

    fn commands(tree: &DefinitionTree, id: DefId) -> &[DefCommand] {
        &tree.get(id).unwrap().commands
    }

    #[test]
    fn class_with_write_block() {
        let tree = parse("Water {\n  write(\"Data Atoms\") {\n    $atom:o $mol @atom:O 0 0 0\n  }\n}\n");
        let water = tree.resolve_class(tree.root(), "Water").unwrap();
        let cmds = commands(&tree, water);
        assert_eq!(cmds.len(), 1);
        let DefCommand::Write {
            channel,
            once,
            template,
            ..
        } = &cmds[0]
        else {
            panic!("expected a write command");
        };
        assert_eq!(channel, "Data Atoms");
        assert!(!once);
        let vars: Vec<&str> = template
            .iter()
            .filter_map(TemplateItem::as_var)
            .map(|v| v.descr.as_str())
            .collect();
        assert_eq!(vars, vec!["atom:o", "mol", "atom:O"]);
    }

    #[test]
    fn instance_with_chain_and_array() {
        let tree = parse("M {}\nmols = new M.rot(90,0,0,1) [3].move(5,0,0)\n");
        let cmds = commands(&tree, tree.root());
        let DefCommand::Instantiate(inst) = &cmds[0] else {
            panic!("expected an instantiation");
        };
        assert_eq!(inst.name.as_deref(), Some("mols"));
        assert_eq!(inst.class, "M");
        assert_eq!(inst.chain.primitives.len(), 1);
        assert_eq!(inst.dims.len(), 1);
        assert_eq!(inst.dims[0].count, 3);
        assert_eq!(inst.dims[0].step.primitives[0].name(), "move");
    }

    #[test]
    fn relative_class_path_keeps_its_dots() {
        let tree = parse("Lib { A {} B { a = new ../A.move(1,0,0) } }");
        let lib = tree.resolve_class(tree.root(), "Lib").unwrap();
        let b = tree.resolve_class(lib, "B").unwrap();
        let DefCommand::Instantiate(inst) = &commands(&tree, b)[0] else {
            panic!("expected an instantiation");
        };
        assert_eq!(inst.class, "../A");
        assert_eq!(inst.chain.primitives.len(), 1);
    }

    #[test]
    fn anonymous_instance_and_instance_body() {
        let tree = parse("M {}\nnew M\nx = new M {\n  write_once(\"In Init\") { units real }\n}\n");
        let cmds = commands(&tree, tree.root());
        assert_eq!(cmds.len(), 2);
        let DefCommand::Instantiate(anon) = &cmds[0] else {
            panic!("expected an instantiation");
        };
        assert!(anon.name.is_none());
        let DefCommand::Instantiate(named) = &cmds[1] else {
            panic!("expected an instantiation");
        };
        let body = named.body.unwrap();
        assert!(matches!(
            commands(&tree, body)[0],
            DefCommand::Write { once: true, .. }
        ));
    }

    #[test]
    fn inheritance_records_base_classes() {
        let tree = parse("A {}\nB {}\nC inherits A B {\n}\n");
        let c = tree.resolve_class(tree.root(), "C").unwrap();
        let bases: Vec<&str> = tree
            .get(c)
            .unwrap()
            .bases
            .iter()
            .map(|b| b.class.as_str())
            .collect();
        assert_eq!(bases, vec!["A", "B"]);
    }

    #[test]
    fn category_assign_delete_push_pop() {
        let tree = parse(
            "category $atom(10,2)\nassign @atom:C 7\npush(.move(1,0,0))\npopright()\ndelete mols[2]\n",
        );
        let cmds = commands(&tree, tree.root());
        assert!(matches!(
            &cmds[0],
            DefCommand::Category { kind: VarKind::Instance, name, start: 10, incr: 2, .. } if name == "atom"
        ));
        assert!(matches!(
            &cmds[1],
            DefCommand::Assign { var, value, .. } if var.descr == "atom:C" && value == "7"
        ));
        assert!(matches!(&cmds[2], DefCommand::Push { side: None, .. }));
        assert!(matches!(
            &cmds[3],
            DefCommand::Pop {
                side: Some(Side::Right),
                ..
            }
        ));
        assert!(matches!(&cmds[4], DefCommand::Delete { target, .. } if target == "mols[2]"));
    }

    #[test]
    fn braced_variables_in_statements() {
        let tree = parse("category @{bond}(5)\nassign ${atom:x} 5\n");
        let cmds = commands(&tree, tree.root());
        assert!(matches!(
            &cmds[0],
            DefCommand::Category { kind: VarKind::Static, name, start: 5, incr: 1, .. } if name == "bond"
        ));
        assert!(matches!(
            &cmds[1],
            DefCommand::Assign { var, value, .. }
                if var.descr == "atom:x" && var.prefix == "${" && var.suffix == "}" && value == "5"
        ));
    }

    #[test]
    fn missing_closing_brace_is_reported() {
        let err = parse_str("t.lt", "A {\n write(\"x\") { a }\n", &[]).unwrap_err();
        assert!(matches!(err, ParseError::Lex(LexError::UnexpectedEof { .. })));
    }

    #[test]
    fn keyword_cannot_name_a_class() {
        let err = parse_str("t.lt", "inherits {}", &[]).unwrap_err();
        assert!(matches!(err, ParseError::Lex(LexError::UnexpectedToken { .. })));
    }

    #[test]
    fn bad_transform_in_new_is_reported() {
        let err = parse_str("t.lt", "M {}\nx = new M.spin(3)\n", &[]).unwrap_err();
        assert!(matches!(
            err,
            ParseError::Transform(TransformError::UnknownPrimitive { .. })
        ));
    }

    #[test]
    fn unknown_statement_after_name_is_rejected() {
        let err = parse_str("t.lt", "A B", &[]).unwrap_err();
        assert!(err.to_string().starts_with("\"t.lt\", line 1: expected"));
    }
}
