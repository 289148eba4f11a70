//! Queryable syntax-tree view over a Rust snippet.
//!
//! Wraps a `syn::File` parsed with span locations enabled, so every node can
//! report its 1-based source line and the exact source text it was parsed
//! from. Subtree queries are structural: they look at every node below the
//! given block, reachable or not.
//!
//! Macro invocations whose bodies parse as comma-separated expressions
//! (`println!`, `vec![..]`, `assert!`, ...) are searched as well, so a
//! self-call written inside `println!("{}", solve(n - 1))` still counts.

use btviz_core::{SignatureIndex, TraceValue};
use proc_macro2::{TokenStream, TokenTree};
use quote::ToTokens;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Block, Expr, FnArg, ImplItem, Item, Lit, Pat, Signature, Token, Type, UnOp};

use crate::error::AnalysisError;

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// A parsed snippet.
#[derive(Debug, Clone)]
pub struct SyntaxTree {
    file: syn::File,
}

/// One routine declaration: a free `fn`, an `impl` method, or a trait method
/// with a default body.
#[derive(Debug, Clone, Copy)]
pub struct Routine<'a> {
    pub sig: &'a Signature,
    pub block: &'a Block,
}

impl SyntaxTree {
    /// Parses `source` as a Rust file.
    pub fn parse(source: &str) -> Result<Self, AnalysisError> {
        let file = syn::parse_file(source)?;
        Ok(SyntaxTree { file })
    }

    pub fn file(&self) -> &syn::File {
        &self.file
    }

    /// All routine declarations in textual order, including those nested in
    /// modules, impls and other function bodies.
    pub fn routines(&self) -> Vec<Routine<'_>> {
        let mut collector = RoutineCollector::default();
        collector.visit_file(&self.file);
        collector.routines
    }

    /// Name of the first top-level `struct`, `enum`, `trait` or `mod`.
    pub fn unit_name(&self) -> Option<String> {
        self.file.items.iter().find_map(|item| match item {
            Item::Struct(s) => Some(s.ident.to_string()),
            Item::Enum(e) => Some(e.ident.to_string()),
            Item::Trait(t) => Some(t.ident.to_string()),
            Item::Mod(m) => Some(m.ident.to_string()),
            _ => None,
        })
    }

    /// Whether the file declares a top-level `fn main()` with no parameters.
    pub fn has_main(&self) -> bool {
        self.file.items.iter().any(|item| match item {
            Item::Fn(f) => is_entry_sig(&f.sig),
            _ => false,
        })
    }

    /// Whether an inherent `impl <unit>` block declares `fn main()`.
    pub fn unit_has_main(&self, unit: &str) -> bool {
        self.file.items.iter().any(|item| match item {
            Item::Impl(imp) if imp.trait_.is_none() && type_last_ident(&imp.self_ty).is_some_and(|i| i == unit) => {
                imp.items.iter().any(|it| matches!(it, ImplItem::Fn(f) if is_entry_sig(&f.sig)))
            }
            _ => false,
        })
    }

    /// Parameter names of every routine, keyed by routine name.
    pub fn signature_index(&self) -> SignatureIndex {
        let mut index = SignatureIndex::new();
        for routine in self.routines() {
            index.insert(routine.name(), routine.param_names());
        }
        index
    }
}

fn is_entry_sig(sig: &Signature) -> bool {
    sig.ident == "main" && sig.inputs.is_empty()
}

fn type_last_ident(ty: &Type) -> Option<&syn::Ident> {
    match ty {
        Type::Path(p) => p.path.segments.last().map(|s| &s.ident),
        _ => None,
    }
}

impl<'a> Routine<'a> {
    pub fn name(&self) -> String {
        self.sig.ident.to_string()
    }

    pub fn line(&self) -> usize {
        line_of(self.sig)
    }

    /// Declared parameter names in order; a receiver is reported as `self`.
    pub fn param_names(&self) -> Vec<String> {
        param_names(self.sig)
    }

    /// Declared parameters with their type annotations, e.g.
    /// `nums: &mut Vec<i32>` or `&mut self`.
    pub fn param_decls(&self) -> Vec<String> {
        self.sig.inputs.iter().map(source_text).collect()
    }
}

/// Declared parameter names of `sig`; a receiver is reported as `self`.
pub fn param_names(sig: &Signature) -> Vec<String> {
    sig.inputs
        .iter()
        .map(|arg| match arg {
            FnArg::Receiver(_) => "self".to_string(),
            FnArg::Typed(pt) => match pt.pat.as_ref() {
                Pat::Ident(pi) => pi.ident.to_string(),
                other => source_text(other),
            },
        })
        .collect()
}

#[derive(Default)]
struct RoutineCollector<'ast> {
    routines: Vec<Routine<'ast>>,
}

impl<'ast> Visit<'ast> for RoutineCollector<'ast> {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        self.routines.push(Routine {
            sig: &node.sig,
            block: &node.block,
        });
        visit::visit_item_fn(self, node);
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        self.routines.push(Routine {
            sig: &node.sig,
            block: &node.block,
        });
        visit::visit_impl_item_fn(self, node);
    }

    fn visit_trait_item_fn(&mut self, node: &'ast syn::TraitItemFn) {
        if let Some(block) = &node.default {
            self.routines.push(Routine {
                sig: &node.sig,
                block,
            });
        }
        visit::visit_trait_item_fn(self, node);
    }
}

// ---------------------------------------------------------------------------
// Node helpers
// ---------------------------------------------------------------------------

/// 1-based line where `node` starts.
pub fn line_of<T: ToTokens>(node: &T) -> usize {
    node.span().start().line
}

/// The exact source text of `node`, or its token rendering when the span
/// carries no source.
pub fn source_text<T: ToTokens>(node: &T) -> String {
    node.span()
        .source_text()
        .unwrap_or_else(|| node.to_token_stream().to_string())
}

/// Whether the token stream contains the `return` keyword at any depth.
pub fn tokens_contain_return(stream: TokenStream) -> bool {
    stream.into_iter().any(|tt| match tt {
        TokenTree::Ident(ident) => ident == "return",
        TokenTree::Group(group) => tokens_contain_return(group.stream()),
        _ => false,
    })
}

/// Parses a macro body as comma-separated expressions, if it is one.
pub fn macro_args(mac: &syn::Macro) -> Option<Punctuated<Expr, Token![,]>> {
    mac.parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated)
        .ok()
}

/// Walks the expression arguments of a macro invocation.
pub(crate) fn descend_into_macro<V>(visitor: &mut V, mac: &syn::Macro)
where
    V: for<'x> Visit<'x>,
{
    if let Some(args) = macro_args(mac) {
        for expr in &args {
            visitor.visit_expr(expr);
        }
    }
}

// ---------------------------------------------------------------------------
// Subtree queries
// ---------------------------------------------------------------------------

/// Lines of every call to a routine named `name` inside `block`, in textual
/// order: `name(..)`, `Path::name(..)` and `receiver.name(..)`.
pub fn calls_named(block: &Block, name: &str) -> Vec<usize> {
    let mut finder = CallFinder {
        name,
        lines: Vec::new(),
    };
    finder.visit_block(block);
    finder.lines
}

struct CallFinder<'n> {
    name: &'n str,
    lines: Vec<usize>,
}

impl<'ast> Visit<'ast> for CallFinder<'_> {
    fn visit_expr_call(&mut self, node: &'ast syn::ExprCall) {
        if let Expr::Path(path) = node.func.as_ref() {
            if path.path.segments.last().is_some_and(|s| s.ident == self.name) {
                self.lines.push(line_of(node));
            }
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast syn::ExprMethodCall) {
        if node.method == self.name {
            self.lines.push(line_of(&node.method));
        }
        visit::visit_expr_method_call(self, node);
    }

    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        descend_into_macro(self, node);
    }
}

/// Lines of every `for`, `while` and `loop` inside `block`.
pub fn loops_in(block: &Block) -> Vec<usize> {
    let mut finder = LoopFinder::default();
    finder.visit_block(block);
    finder.lines
}

#[derive(Default)]
struct LoopFinder {
    lines: Vec<usize>,
}

impl<'ast> Visit<'ast> for LoopFinder {
    fn visit_expr_for_loop(&mut self, node: &'ast syn::ExprForLoop) {
        self.lines.push(line_of(node));
        visit::visit_expr_for_loop(self, node);
    }

    fn visit_expr_while(&mut self, node: &'ast syn::ExprWhile) {
        self.lines.push(line_of(node));
        visit::visit_expr_while(self, node);
    }

    fn visit_expr_loop(&mut self, node: &'ast syn::ExprLoop) {
        self.lines.push(line_of(node));
        visit::visit_expr_loop(self, node);
    }

    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        descend_into_macro(self, node);
    }
}

/// Source text of every `return <expr>` inside `block`, in textual order.
/// Bare `return;` contributes nothing.
pub fn return_expressions(block: &Block) -> Vec<String> {
    let mut finder = ReturnFinder::default();
    finder.visit_block(block);
    finder.exprs
}

#[derive(Default)]
struct ReturnFinder {
    exprs: Vec<String>,
}

impl<'ast> Visit<'ast> for ReturnFinder {
    fn visit_expr_return(&mut self, node: &'ast syn::ExprReturn) {
        if let Some(expr) = &node.expr {
            self.exprs.push(source_text(expr.as_ref()));
        }
        visit::visit_expr_return(self, node);
    }

    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        descend_into_macro(self, node);
    }
}

/// Lines of every `if` whose then-branch textually contains `return`.
pub fn guarded_returns(block: &Block) -> Vec<usize> {
    let mut finder = GuardFinder::default();
    finder.visit_block(block);
    finder.lines
}

#[derive(Default)]
struct GuardFinder {
    lines: Vec<usize>,
}

impl<'ast> Visit<'ast> for GuardFinder {
    fn visit_expr_if(&mut self, node: &'ast syn::ExprIf) {
        if tokens_contain_return(node.then_branch.to_token_stream()) {
            self.lines.push(line_of(node));
        }
        visit::visit_expr_if(self, node);
    }

    fn visit_macro(&mut self, node: &'ast syn::Macro) {
        descend_into_macro(self, node);
    }
}

// ---------------------------------------------------------------------------
// Literal extraction
// ---------------------------------------------------------------------------

/// Best-effort value of an expression without evaluating it.
///
/// Literals become their tagged value, `None` becomes null, a bare variable
/// becomes its name, arrays and `vec![..]` become lists, and anything else
/// becomes an object descriptor holding its source text.
pub fn literal_value(expr: &Expr) -> TraceValue {
    match expr {
        Expr::Lit(lit) => lit_value(&lit.lit),
        Expr::Unary(unary) if matches!(unary.op, UnOp::Neg(_)) => match literal_value(&unary.expr) {
            TraceValue::Int(v) => TraceValue::Int(-v),
            TraceValue::Float(v) => TraceValue::Float(-v),
            _ => TraceValue::Object(source_text(expr)),
        },
        Expr::Paren(p) => literal_value(&p.expr),
        Expr::Group(g) => literal_value(&g.expr),
        Expr::Reference(r) => literal_value(&r.expr),
        Expr::Array(arr) => TraceValue::List(arr.elems.iter().map(literal_value).collect()),
        Expr::Path(p) if p.qself.is_none() && p.path.is_ident("None") => TraceValue::Null,
        Expr::Path(p) if p.qself.is_none() => match p.path.get_ident() {
            Some(ident) => TraceValue::Str(ident.to_string()),
            None => TraceValue::Object(source_text(expr)),
        },
        Expr::Macro(m) if m.mac.path.is_ident("vec") => match macro_args(&m.mac) {
            Some(args) => TraceValue::List(args.iter().map(literal_value).collect()),
            None => TraceValue::Object(source_text(expr)),
        },
        _ => TraceValue::Object(source_text(expr)),
    }
}

fn lit_value(lit: &Lit) -> TraceValue {
    match lit {
        Lit::Str(s) => TraceValue::Str(s.value()),
        Lit::Char(c) => TraceValue::Char(c.value()),
        Lit::Bool(b) => TraceValue::Bool(b.value),
        Lit::Byte(b) => TraceValue::Int(b.value() as i64),
        Lit::Int(i) => match i.base10_parse::<i64>() {
            Ok(v) => TraceValue::Int(v),
            Err(_) => TraceValue::Object(i.base10_digits().to_string()),
        },
        Lit::Float(f) => match f.base10_parse::<f64>() {
            Ok(v) => TraceValue::Float(v),
            Err(_) => TraceValue::Object(f.base10_digits().to_string()),
        },
        other => TraceValue::Object(source_text(other)),
    }
}

/// String content of a string-literal expression.
pub fn string_literal(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(syn::ExprLit { lit: Lit::Str(s), .. }) => Some(s.value()),
        Expr::Paren(p) => string_literal(&p.expr),
        Expr::Group(g) => string_literal(&g.expr),
        _ => None,
    }
}
