use crate::functions::Syntax;

/// Parsed query expression, produced by the surrounding front end.
///
/// The engine treats the parser as an opaque collaborator: everything after the
/// grammar — identifier resolution, overload selection, typing — happens in the
/// compiler, against this shape.
#[derive(Clone, Debug, PartialEq)]
pub enum Ast {
    Number(f64),
    Str(String),
    /// Keyword argument such as `ASC` in sort functions.
    Symbol(String),
    /// Dotted identifier path, e.g. `["Time", "1997", "Q1"]`.
    Id(Vec<String>),
    Call {
        name: String,
        syntax: Syntax,
        args: Vec<Ast>,
    },
}

impl Ast {
    /// Shorthand for a plain function call.
    pub fn call(name: impl Into<String>, args: Vec<Ast>) -> Self {
        Ast::Call {
            name: name.into(),
            syntax: Syntax::Function,
            args,
        }
    }

    /// Shorthand for an infix operator application.
    pub fn infix(name: impl Into<String>, left: Ast, right: Ast) -> Self {
        Ast::Call {
            name: name.into(),
            syntax: Syntax::Infix,
            args: vec![left, right],
        }
    }

    /// Shorthand for a property access like `<object>.Children`.
    pub fn property(object: Ast, name: impl Into<String>) -> Self {
        Ast::Call {
            name: name.into(),
            syntax: Syntax::Property,
            args: vec![object],
        }
    }

    pub fn id<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Ast::Id(segments.into_iter().map(Into::into).collect())
    }

    /// Shorthand for a braces set constructor `{...}`.
    pub fn braces(args: Vec<Ast>) -> Self {
        Ast::Call {
            name: "{}".to_string(),
            syntax: Syntax::Braces,
            args,
        }
    }

    /// Shorthand for a parenthesized tuple `(...)`.
    pub fn parens(args: Vec<Ast>) -> Self {
        Ast::Call {
            name: "()".to_string(),
            syntax: Syntax::Parentheses,
            args,
        }
    }
}
