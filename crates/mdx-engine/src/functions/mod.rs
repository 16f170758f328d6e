//! Operator/function identity, overload metadata and resolution.
//!
//! Every operation the compiler can emit — infix arithmetic, property
//! accessors like `.Children`, set functions, brace/paren constructors — is
//! registered here as one or more [`FunctionMetaData`] candidates behind a
//! [`Resolver`]. Resolution is pure and deterministic: candidates are scored by
//! total implicit-conversion cost and ties go to the earlier-registered
//! candidate.

use crate::calc::Calc;
use crate::compiler::Compiler;
use crate::error::EngineResult;
use crate::types::{conversion_cost, DataType};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

mod builtins_arith;
mod builtins_member;
mod builtins_set;

/// Syntactic shape of an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Syntax {
    Function,
    Property,
    QuotedProperty,
    Infix,
    Prefix,
    Postfix,
    Braces,
    Parentheses,
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Syntax::Function => "function",
            Syntax::Property => "property",
            Syntax::QuotedProperty => "quoted property",
            Syntax::Infix => "infix",
            Syntax::Prefix => "prefix",
            Syntax::Postfix => "postfix",
            Syntax::Braces => "braces",
            Syntax::Parentheses => "parentheses",
        };
        f.write_str(name)
    }
}

/// Identity of an operator/function: name plus syntactic shape.
///
/// Name comparison is case-insensitive; the table folds names when keying.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationAtom {
    pub name: String,
    pub syntax: Syntax,
}

impl OperationAtom {
    pub fn new(name: impl Into<String>, syntax: Syntax) -> Self {
        Self {
            name: name.into(),
            syntax,
        }
    }

    pub fn function(name: impl Into<String>) -> Self {
        Self::new(name, Syntax::Function)
    }

    pub fn property(name: impl Into<String>) -> Self {
        Self::new(name, Syntax::Property)
    }

    pub fn infix(name: impl Into<String>) -> Self {
        Self::new(name, Syntax::Infix)
    }

    fn key(&self) -> (String, Syntax) {
        (self.name.to_ascii_lowercase(), self.syntax)
    }
}

/// One overload candidate: atom, documentation, return category and ordered
/// parameter categories.
#[derive(Clone, Debug)]
pub struct FunctionMetaData {
    pub atom: OperationAtom,
    pub description: &'static str,
    pub returns: DataType,
    pub parameters: Vec<DataType>,
}

/// Executable binding of metadata to a compile strategy. Stateless.
pub trait FunctionDefinition {
    fn meta(&self) -> &FunctionMetaData;

    /// Turn resolved, conversion-wrapped argument nodes into a calc-tree node.
    fn compile_call(&self, args: Vec<Calc>, compiler: &mut Compiler<'_>) -> EngineResult<Calc>;
}

type CompileFn = fn(Vec<Calc>, &mut Compiler<'_>) -> EngineResult<Calc>;

/// Function definition backed by a plain compile function; how all builtins
/// are declared.
pub struct BuiltinDef {
    meta: FunctionMetaData,
    compile: CompileFn,
}

impl BuiltinDef {
    pub fn new(meta: FunctionMetaData, compile: CompileFn) -> Self {
        Self { meta, compile }
    }
}

impl FunctionDefinition for BuiltinDef {
    fn meta(&self) -> &FunctionMetaData {
        &self.meta
    }

    fn compile_call(&self, args: Vec<Calc>, compiler: &mut Compiler<'_>) -> EngineResult<Calc> {
        (self.compile)(args, compiler)
    }
}

/// Conversion oracle handed to resolvers; wraps the static cost table so a
/// future validator can thread catalog-dependent rules through resolution.
#[derive(Clone, Copy, Debug, Default)]
pub struct Validator;

impl Validator {
    pub fn conversion_cost(&self, from: DataType, to: DataType) -> Option<u32> {
        conversion_cost(from, to)
    }
}

/// Maps call-site argument types to the best-matching overload it owns.
pub trait Resolver {
    fn atom(&self) -> &OperationAtom;

    /// `None` is a normal negative result (try the next resolver), not an
    /// error.
    fn resolve(&self, args: &[DataType], validator: &Validator)
        -> Option<&dyn FunctionDefinition>;

    /// Words this resolver reserves in the grammar, unioned by the table.
    fn reserved_words(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Resolver over an ordered list of fixed-arity candidates.
pub struct SimpleResolver {
    atom: OperationAtom,
    candidates: Vec<BuiltinDef>,
}

impl SimpleResolver {
    pub fn new(atom: OperationAtom, candidates: Vec<BuiltinDef>) -> Self {
        debug_assert!(
            candidates.iter().all(|c| c.meta.atom == atom),
            "candidate registered under a foreign atom"
        );
        Self { atom, candidates }
    }
}

impl Resolver for SimpleResolver {
    fn atom(&self) -> &OperationAtom {
        &self.atom
    }

    fn resolve(
        &self,
        args: &[DataType],
        validator: &Validator,
    ) -> Option<&dyn FunctionDefinition> {
        let mut best: Option<(u32, &BuiltinDef)> = None;
        for candidate in &self.candidates {
            if candidate.meta.parameters.len() != args.len() {
                continue;
            }
            let mut total = 0u32;
            let mut convertible = true;
            for (arg, param) in args.iter().zip(&candidate.meta.parameters) {
                match validator.conversion_cost(*arg, *param) {
                    Some(cost) => total += cost,
                    None => {
                        convertible = false;
                        break;
                    }
                }
            }
            if !convertible {
                continue;
            }
            // Strict less-than keeps the earliest registration on cost ties.
            if best.map_or(true, |(cost, _)| total < cost) {
                best = Some((total, candidate));
            }
        }
        best.map(|(_, def)| def as &dyn FunctionDefinition)
    }
}

/// Registry of resolvers keyed by (case-folded name, syntax), in registration
/// order, plus the reserved/property word unions built at startup.
pub struct FunctionTable {
    resolvers: HashMap<(String, Syntax), Vec<Box<dyn Resolver>>>,
    reserved_words: BTreeSet<String>,
    property_words: BTreeSet<String>,
}

impl FunctionTable {
    pub fn empty() -> Self {
        Self {
            resolvers: HashMap::new(),
            reserved_words: BTreeSet::new(),
            property_words: BTreeSet::new(),
        }
    }

    /// Table with every builtin operator and function registered.
    pub fn with_builtins() -> Self {
        let mut table = Self::empty();
        builtins_arith::register(&mut table);
        builtins_member::register(&mut table);
        builtins_set::register(&mut table);
        table
    }

    pub fn register(&mut self, resolver: Box<dyn Resolver>) {
        let atom = resolver.atom();
        match atom.syntax {
            Syntax::Property | Syntax::QuotedProperty => {
                self.property_words.insert(atom.name.to_ascii_uppercase());
            }
            // Named function atoms are reserved against plain-identifier
            // resolution in the surrounding grammar; operator symbols and
            // the brace/paren constructors are not words.
            Syntax::Function => {
                self.reserved_words.insert(atom.name.to_ascii_uppercase());
            }
            _ => {}
        }
        for word in resolver.reserved_words() {
            self.reserved_words.insert(word.to_ascii_uppercase());
        }
        self.resolvers.entry(atom.key()).or_default().push(resolver);
    }

    /// Resolvers registered for an atom, in registration order.
    pub fn resolvers_for(&self, name: &str, syntax: Syntax) -> &[Box<dyn Resolver>] {
        self.resolvers
            .get(&OperationAtom::new(name, syntax).key())
            .map_or(&[], Vec::as_slice)
    }

    pub fn reserved_words(&self) -> &BTreeSet<String> {
        &self.reserved_words
    }

    pub fn property_words(&self) -> &BTreeSet<String> {
        &self.property_words
    }

    pub fn is_property_word(&self, word: &str) -> bool {
        self.property_words.contains(&word.to_ascii_uppercase())
    }

    pub fn is_reserved_word(&self, word: &str) -> bool {
        self.reserved_words.contains(&word.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Calc;

    fn dummy_compile(_args: Vec<Calc>, _compiler: &mut Compiler<'_>) -> EngineResult<Calc> {
        Ok(Calc::Literal(mdx_model::CellValue::Blank))
    }

    fn candidate(params: Vec<DataType>, returns: DataType) -> BuiltinDef {
        BuiltinDef::new(
            FunctionMetaData {
                atom: OperationAtom::function("Test"),
                description: "test candidate",
                returns,
                parameters: params,
            },
            dummy_compile,
        )
    }

    #[test]
    fn lowest_conversion_cost_wins() {
        let resolver = SimpleResolver::new(
            OperationAtom::function("Test"),
            vec![
                candidate(vec![DataType::Value], DataType::String),
                candidate(vec![DataType::Numeric], DataType::Numeric),
            ],
        );
        let validator = Validator;
        // Numeric arg: exact match (cost 0) beats widening to Value (cost 1),
        // even though the Value candidate was registered first.
        let winner = resolver.resolve(&[DataType::Numeric], &validator).unwrap();
        assert_eq!(winner.meta().returns, DataType::Numeric);
    }

    #[test]
    fn ties_go_to_the_earlier_registration() {
        let resolver = SimpleResolver::new(
            OperationAtom::function("Test"),
            vec![
                candidate(vec![DataType::Numeric], DataType::String),
                candidate(vec![DataType::Numeric], DataType::Numeric),
            ],
        );
        let winner = resolver.resolve(&[DataType::Numeric], &Validator).unwrap();
        assert_eq!(winner.meta().returns, DataType::String);
    }

    #[test]
    fn unconvertible_arguments_yield_no_match() {
        let resolver = SimpleResolver::new(
            OperationAtom::function("Test"),
            vec![candidate(vec![DataType::Numeric], DataType::Numeric)],
        );
        assert!(resolver.resolve(&[DataType::Set], &Validator).is_none());
        // Arity mismatch is also a plain no-match.
        assert!(resolver.resolve(&[], &Validator).is_none());
    }

    #[test]
    fn resolution_is_deterministic() {
        let resolver = SimpleResolver::new(
            OperationAtom::function("Test"),
            vec![
                candidate(vec![DataType::Value], DataType::String),
                candidate(vec![DataType::Value], DataType::Numeric),
            ],
        );
        for _ in 0..10 {
            let winner = resolver.resolve(&[DataType::Numeric], &Validator).unwrap();
            assert_eq!(winner.meta().returns, DataType::String);
        }
    }

    #[test]
    fn property_words_are_unioned() {
        let table = FunctionTable::with_builtins();
        assert!(table.is_property_word("CurrentMember"));
        assert!(table.is_property_word("children"));
        assert!(table.is_property_word("MEMBERS"));
        assert!(!table.is_property_word("CrossJoin"));
    }

    #[test]
    fn named_functions_become_reserved_words() {
        let table = FunctionTable::with_builtins();
        assert!(table.is_reserved_word("Sum"));
        assert!(table.is_reserved_word("CROSSJOIN"));
        assert!(table.is_reserved_word("filter"));
        assert!(table.is_reserved_word("Except"));
        assert!(table.is_reserved_word("Count"));
        // Properties, operator symbols and the constructors stay out.
        assert!(!table.is_reserved_word("Members"));
        assert!(!table.is_reserved_word("+"));
        assert!(!table.is_reserved_word("{}"));
    }

    struct KeywordResolver {
        atom: OperationAtom,
    }

    impl Resolver for KeywordResolver {
        fn atom(&self) -> &OperationAtom {
            &self.atom
        }

        fn resolve(
            &self,
            _args: &[DataType],
            _validator: &Validator,
        ) -> Option<&dyn FunctionDefinition> {
            None
        }

        fn reserved_words(&self) -> &'static [&'static str] {
            &["case", "When"]
        }
    }

    #[test]
    fn resolver_reserved_words_are_unioned_case_folded() {
        let mut table = FunctionTable::empty();
        table.register(Box::new(KeywordResolver {
            atom: OperationAtom::infix("+"),
        }));
        assert!(table.is_reserved_word("CASE"));
        assert!(table.is_reserved_word("when"));
        assert!(!table.is_reserved_word("+"));
    }
}
