//! Exports analyzer — AST-based export extraction for the primary (JS/TS) source
//! ecosystem (§4.3).
//!
//! Parses a file with `tree-sitter` and derives the set of values it publishes to
//! importers: whole-module assignment (`module.exports = X`), a property on the
//! module's exports namespace (`module.exports.foo = X` / `exports.foo = X`),
//! `export default`, `export class/function/const`, and named re-export
//! specifiers (`export { X as Y }`).
//!
//! A pure function of (content, file name) — memoized by content hash (§4.3, §9).

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tree_sitter::{Node, Parser, Tree};

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Class,
    Function,
    Object,
    Unknown,
}

/// How a value reaches importers. Persisted in [`crate::cache::ResolutionRecord`]
/// so a cache hit knows how to re-derive the export without re-running the
/// analyzer (§4.7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDescriptor {
    Direct,
    Default,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportInfo {
    pub kind: ExportKind,
    pub name: String,
    pub methods: BTreeSet<String>,
    pub properties: BTreeSet<String>,
    pub base_class: Option<String>,
}

impl ExportInfo {
    fn unknown(name: impl Into<String>) -> Self {
        ExportInfo {
            kind: ExportKind::Unknown,
            name: name.into(),
            methods: BTreeSet::new(),
            properties: BTreeSet::new(),
            base_class: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    /// `None` for default exports.
    pub name: Option<String>,
    pub access: AccessDescriptor,
    pub info: ExportInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExportsMetadata {
    pub exports: Vec<Export>,
}

// ---------------------------------------------------------------------------
// Language resolution
// ---------------------------------------------------------------------------

fn language_for_ext(ext: &str) -> Option<tree_sitter::Language> {
    match ext.trim_start_matches('.') {
        "ts" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "tsx" => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        "js" | "jsx" | "mjs" | "cjs" => Some(tree_sitter_javascript::LANGUAGE.into()),
        _ => None,
    }
}

fn ext_of(file_name: &str) -> &str {
    file_name.rsplit_once('.').map(|(_, e)| e).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Symbol table (top-level declarations, for identifier resolution)
// ---------------------------------------------------------------------------

type SymbolTable<'a> = HashMap<String, Node<'a>>;

fn collect_top_level_symbols<'a>(root: Node<'a>, source: &[u8]) -> SymbolTable<'a> {
    let mut table = HashMap::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        record_symbol(child, source, &mut table);
    }
    table
}

fn record_symbol<'a>(node: Node<'a>, source: &[u8], table: &mut SymbolTable<'a>) {
    match node.kind() {
        "class_declaration" | "function_declaration" | "generator_function_declaration" => {
            if let Some(name) = node.child_by_field_name("name") {
                if let Ok(text) = name.utf8_text(source) {
                    table.insert(text.to_string(), node);
                }
            }
        }
        "lexical_declaration" | "variable_declaration" => {
            let mut c = node.walk();
            for declarator in node.children(&mut c) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                if let (Some(name_node), Some(value_node)) = (
                    declarator.child_by_field_name("name"),
                    declarator.child_by_field_name("value"),
                ) {
                    if let Ok(text) = name_node.utf8_text(source) {
                        table.insert(text.to_string(), value_node);
                    }
                }
            }
        }
        "export_statement" => {
            if let Some(decl) = node.child_by_field_name("declaration") {
                record_symbol(decl, source, table);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Declaration -> ExportInfo classification
// ---------------------------------------------------------------------------

fn is_static(node: Node) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == "static");
    result
}

fn class_base_name(node: Node, source: &[u8]) -> Option<String> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "class_heritage" {
            let target = child.child_by_field_name("value").unwrap_or(child);
            if let Ok(text) = target.utf8_text(source) {
                // Strip generic type arguments / trailing noise, keep the head identifier.
                let base = text.trim().split(['<', ' ']).next().unwrap_or(text).trim();
                if !base.is_empty() {
                    return Some(base.to_string());
                }
            }
        }
    }
    None
}

fn class_info(node: Node, source: &[u8], name: &str) -> ExportInfo {
    let mut methods = BTreeSet::new();
    let mut properties = BTreeSet::new();

    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for member in body.children(&mut cursor) {
            match member.kind() {
                "method_definition" => {
                    if is_static(member) {
                        continue;
                    }
                    let member_name = member
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(source).ok())
                        .unwrap_or("");
                    if member_name.is_empty() {
                        continue;
                    }
                    if member_name == "constructor" {
                        collect_this_assignments(member, source, &mut properties);
                        continue;
                    }
                    methods.insert(member_name.to_string());
                }
                "field_definition" | "public_field_definition" => {
                    if is_static(member) {
                        continue;
                    }
                    if let Some(prop) = member
                        .child_by_field_name("property")
                        .or_else(|| member.child_by_field_name("name"))
                        .and_then(|n| n.utf8_text(source).ok())
                    {
                        properties.insert(prop.to_string());
                    }
                }
                _ => {}
            }
        }
    }

    ExportInfo {
        kind: ExportKind::Class,
        name: name.to_string(),
        methods,
        properties,
        base_class: class_base_name(node, source),
    }
}

/// Scan a constructor body for `this.foo = ...` assignments, recording `foo`.
fn collect_this_assignments(method: Node, source: &[u8], properties: &mut BTreeSet<String>) {
    let Some(body) = method.child_by_field_name("body") else { return };
    walk_for_this_assignments(body, source, properties);
}

fn walk_for_this_assignments(node: Node, source: &[u8], properties: &mut BTreeSet<String>) {
    if node.kind() == "assignment_expression" {
        if let Some(left) = node.child_by_field_name("left") {
            if left.kind() == "member_expression" {
                let object = left.child_by_field_name("object").and_then(|n| n.utf8_text(source).ok());
                let property = left.child_by_field_name("property").and_then(|n| n.utf8_text(source).ok());
                if object == Some("this") {
                    if let Some(p) = property {
                        properties.insert(p.to_string());
                    }
                }
            }
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_for_this_assignments(child, source, properties);
    }
}

fn object_info(node: Node, source: &[u8], name: &str) -> ExportInfo {
    let mut methods = BTreeSet::new();
    let mut properties = BTreeSet::new();

    let mut cursor = node.walk();
    for member in node.children(&mut cursor) {
        match member.kind() {
            "pair" => {
                let key = member
                    .child_by_field_name("key")
                    .and_then(|n| n.utf8_text(source).ok())
                    .map(|s| s.trim_matches(['"', '\'']).to_string());
                let Some(key) = key else { continue };
                let is_fn = member
                    .child_by_field_name("value")
                    .map(|v| matches!(v.kind(), "function_expression" | "arrow_function" | "generator_function"))
                    .unwrap_or(false);
                if is_fn {
                    methods.insert(key);
                } else {
                    properties.insert(key);
                }
            }
            "method_definition" => {
                if let Some(n) = member.child_by_field_name("name").and_then(|n| n.utf8_text(source).ok()) {
                    methods.insert(n.to_string());
                }
            }
            "shorthand_property_identifier" => {
                if let Ok(n) = member.utf8_text(source) {
                    properties.insert(n.to_string());
                }
            }
            _ => {}
        }
    }

    ExportInfo { kind: ExportKind::Object, name: name.to_string(), methods, properties, base_class: None }
}

/// Classify a declaration/expression node into an [`ExportInfo`], resolving
/// bare identifiers against the file-local symbol table (§4.3).
fn classify_node(node: Node, source: &[u8], name_hint: &str, symbols: &SymbolTable) -> ExportInfo {
    match node.kind() {
        "class_declaration" | "class_expression" | "class" => {
            let name = node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
                .unwrap_or(name_hint);
            class_info(node, source, name)
        }
        "function_declaration" | "function_expression" | "arrow_function"
        | "generator_function_declaration" | "generator_function" => {
            let name = node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
                .unwrap_or(name_hint);
            ExportInfo {
                kind: ExportKind::Function,
                name: name.to_string(),
                methods: BTreeSet::new(),
                properties: BTreeSet::new(),
                base_class: None,
            }
        }
        "object" => object_info(node, source, name_hint),
        "identifier" | "shorthand_property_identifier" => {
            let ident = node.utf8_text(source).unwrap_or(name_hint);
            match symbols.get(ident) {
                Some(&target) if target.id() != node.id() => {
                    classify_node(target, source, ident, symbols)
                }
                _ => ExportInfo::unknown(ident),
            }
        }
        _ => ExportInfo::unknown(name_hint),
    }
}

// ---------------------------------------------------------------------------
// Export-statement walking
// ---------------------------------------------------------------------------

fn has_default_keyword(node: Node) -> bool {
    let mut cursor = node.walk();
    let result = node.children(&mut cursor).any(|c| c.kind() == "default");
    result
}

fn walk_export_statement(
    node: Node,
    source: &[u8],
    symbols: &SymbolTable,
    out: &mut Vec<Export>,
) {
    if has_default_keyword(node) {
        let target = node
            .child_by_field_name("declaration")
            .or_else(|| node.child_by_field_name("value"))
            .or_else(|| {
                // Last named child that isn't the `export`/`default` keywords.
                let mut cursor = node.walk();
                node.named_children(&mut cursor).last()
            });
        if let Some(target) = target {
            let info = classify_node(target, source, "default", symbols);
            out.push(Export { name: None, access: AccessDescriptor::Default, info });
        }
        return;
    }

    if let Some(decl) = node.child_by_field_name("declaration") {
        match decl.kind() {
            "lexical_declaration" | "variable_declaration" => {
                let mut cursor = decl.walk();
                for declarator in decl.children(&mut cursor) {
                    if declarator.kind() != "variable_declarator" {
                        continue;
                    }
                    let Some(name_node) = declarator.child_by_field_name("name") else { continue };
                    let Ok(name) = name_node.utf8_text(source) else { continue };
                    let info = match declarator.child_by_field_name("value") {
                        Some(value) => classify_node(value, source, name, symbols),
                        None => ExportInfo::unknown(name),
                    };
                    out.push(Export {
                        name: Some(name.to_string()),
                        access: AccessDescriptor::Named(name.to_string()),
                        info,
                    });
                }
            }
            "class_declaration" | "function_declaration" | "generator_function_declaration" => {
                let name = decl
                    .child_by_field_name("name")
                    .and_then(|n| n.utf8_text(source).ok())
                    .unwrap_or("default")
                    .to_string();
                let info = classify_node(decl, source, &name, symbols);
                out.push(Export { name: Some(name.clone()), access: AccessDescriptor::Named(name), info });
            }
            _ => {}
        }
        return;
    }

    // `export { A, B as C };` — named re-export specifiers, possibly resolved
    // transitively against the local symbol table (§4.3's re-export supplement).
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() != "export_clause" {
            continue;
        }
        let mut spec_cursor = child.walk();
        for spec in child.children(&mut spec_cursor) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let local = spec
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
                .unwrap_or("");
            if local.is_empty() {
                continue;
            }
            let exported = spec
                .child_by_field_name("alias")
                .and_then(|n| n.utf8_text(source).ok())
                .unwrap_or(local);
            let info = match symbols.get(local) {
                Some(&target) => classify_node(target, source, exported, symbols),
                None => ExportInfo::unknown(exported),
            };
            out.push(Export {
                name: Some(exported.to_string()),
                access: AccessDescriptor::Named(exported.to_string()),
                info,
            });
        }
    }
}

fn walk_commonjs_assignment(
    node: Node,
    source: &[u8],
    symbols: &SymbolTable,
    out: &mut Vec<Export>,
) {
    // `node` is an `expression_statement`; look for a top-level assignment.
    let mut cursor = node.walk();
    let Some(assign) = node.children(&mut cursor).find(|c| c.kind() == "assignment_expression")
    else {
        return;
    };
    let Some(left) = assign.child_by_field_name("left") else { return };
    let Some(right) = assign.child_by_field_name("right") else { return };
    if left.kind() != "member_expression" {
        return;
    }
    let Some(object) = left.child_by_field_name("object") else { return };
    let Some(property) = left.child_by_field_name("property") else { return };
    let Ok(object_text) = object.utf8_text(source) else { return };
    let Ok(property_text) = property.utf8_text(source) else { return };

    if object_text == "module" && property_text == "exports" {
        // `module.exports = X`
        let info = classify_node(right, source, "module.exports", symbols);
        out.push(Export { name: None, access: AccessDescriptor::Direct, info });
        return;
    }

    if object.kind() == "member_expression" {
        let inner_object = object.child_by_field_name("object").and_then(|n| n.utf8_text(source).ok());
        let inner_property = object.child_by_field_name("property").and_then(|n| n.utf8_text(source).ok());
        if inner_object == Some("module") && inner_property == Some("exports") {
            // `module.exports.foo = X`
            let info = classify_node(right, source, property_text, symbols);
            out.push(Export {
                name: Some(property_text.to_string()),
                access: AccessDescriptor::Named(property_text.to_string()),
                info,
            });
            return;
        }
    }

    if object_text == "exports" {
        // `exports.foo = X` (the ambient exports alias)
        let info = classify_node(right, source, property_text, symbols);
        out.push(Export {
            name: Some(property_text.to_string()),
            access: AccessDescriptor::Named(property_text.to_string()),
            info,
        });
    }
}

fn parse_tree(content: &str, ext: &str) -> Option<Tree> {
    let lang = language_for_ext(ext)?;
    let mut parser = Parser::new();
    parser.set_language(&lang).ok()?;
    parser.parse(content, None)
}

/// Analyze file content and derive its [`ExportsMetadata`]. Returns `None` when
/// the extension isn't a recognized JS/TS variant or the content fails to parse
/// (§4.3's "Parse errors never propagate" — the caller falls back to
/// content-based scoring).
pub fn analyze(content: &str, file_name: &str) -> Option<ExportsMetadata> {
    let ext = ext_of(file_name);
    let tree = parse_tree(content, ext)?;
    let root = tree.root_node();
    if root.has_error() && root.named_child_count() == 0 {
        return None;
    }

    let source = content.as_bytes();
    let symbols = collect_top_level_symbols(root, source);

    let mut exports = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        match child.kind() {
            "export_statement" => walk_export_statement(child, source, &symbols, &mut exports),
            "expression_statement" => walk_commonjs_assignment(child, source, &symbols, &mut exports),
            _ => {}
        }
    }

    Some(ExportsMetadata { exports })
}

// ---------------------------------------------------------------------------
// Content-hash-memoized analyzer (§4.3, §9)
// ---------------------------------------------------------------------------

fn content_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Bounded LRU memoization table over `(content hash, file name) -> Option<ExportsMetadata>`.
/// Negative results (unparseable files) are memoized too, to avoid reparse churn.
pub struct ExportsCache {
    inner: Mutex<LruCache<(String, String), Option<ExportsMetadata>>>,
}

impl ExportsCache {
    pub fn new(capacity: usize) -> Self {
        let cap = std::num::NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { inner: Mutex::new(LruCache::new(cap)) }
    }

    /// Analyze `content`, reusing a cached result when `(hash(content), file_name)`
    /// has been seen before.
    pub fn analyze(&self, content: &str, file_name: &str) -> Option<ExportsMetadata> {
        let key = (content_digest(content), file_name.to_string());
        {
            let mut guard = self.inner.lock().unwrap();
            if let Some(cached) = guard.get(&key) {
                return cached.clone();
            }
        }
        let result = analyze(content, file_name);
        self.inner.lock().unwrap().put(key, result.clone());
        result
    }
}

impl Default for ExportsCache {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find_named<'a>(meta: &'a ExportsMetadata, name: &str) -> &'a Export {
        meta.exports
            .iter()
            .find(|e| e.name.as_deref() == Some(name))
            .unwrap_or_else(|| panic!("export `{name}` not found in {meta:?}"))
    }

    #[test]
    fn class_export_default() {
        let src = r#"
            export default class UserService {
                constructor() {
                    this.active = true;
                }
                login() {}
                logout() {}
                static helper() {}
            }
        "#;
        let meta = analyze(src, "UserService.ts").expect("should parse");
        assert_eq!(meta.exports.len(), 1);
        let export = &meta.exports[0];
        assert_eq!(export.access, AccessDescriptor::Default);
        assert_eq!(export.info.kind, ExportKind::Class);
        assert!(export.info.methods.contains("login"));
        assert!(export.info.methods.contains("logout"));
        assert!(!export.info.methods.contains("helper"), "static methods are excluded");
        assert!(export.info.properties.contains("active"));
    }

    #[test]
    fn class_export_with_extends() {
        let src = r#"
            class BaseRepository {}
            export class Repository extends BaseRepository {
                find() {}
            }
        "#;
        let meta = analyze(src, "Repository.js").expect("should parse");
        let export = find_named(&meta, "Repository");
        assert_eq!(export.info.base_class.as_deref(), Some("BaseRepository"));
    }

    #[test]
    fn commonjs_module_exports_direct() {
        let src = r#"
            class Calculator {
                add(a, b) { return a + b; }
            }
            module.exports = Calculator;
        "#;
        let meta = analyze(src, "Calculator.js").expect("should parse");
        assert_eq!(meta.exports.len(), 1);
        let export = &meta.exports[0];
        assert_eq!(export.access, AccessDescriptor::Direct);
        assert_eq!(export.info.kind, ExportKind::Class);
        assert!(export.info.methods.contains("add"));
    }

    #[test]
    fn commonjs_named_export() {
        let src = r#"
            function formatName(name) { return name.trim(); }
            module.exports.formatName = formatName;
        "#;
        let meta = analyze(src, "format.js").expect("should parse");
        let export = find_named(&meta, "formatName");
        assert_eq!(export.info.kind, ExportKind::Function);
    }

    #[test]
    fn exports_alias_named_export() {
        let src = r#"
            exports.add = function (a, b) { return a + b; };
        "#;
        let meta = analyze(src, "math.js").expect("should parse");
        let export = find_named(&meta, "add");
        assert_eq!(export.info.kind, ExportKind::Function);
    }

    #[test]
    fn object_literal_export() {
        let src = r#"
            const Config = {
                name: "app",
                init() {},
            };
            export default Config;
        "#;
        let meta = analyze(src, "Config.ts").expect("should parse");
        let export = &meta.exports[0];
        assert_eq!(export.info.kind, ExportKind::Object);
        assert!(export.info.methods.contains("init"));
        assert!(export.info.properties.contains("name"));
    }

    #[test]
    fn re_export_specifier_resolves_locally() {
        let src = r#"
            class Widget {
                render() {}
            }
            export { Widget as default };
        "#;
        let meta = analyze(src, "widget.js").expect("should parse");
        let export = find_named(&meta, "default");
        assert_eq!(export.info.kind, ExportKind::Class);
        assert!(export.info.methods.contains("render"));
    }

    #[test]
    fn unparseable_extension_returns_none() {
        assert!(analyze("not js", "README.md").is_none());
    }

    #[test]
    fn cache_memoizes_by_content_and_name() {
        let cache = ExportsCache::new(10);
        let src = "export default function foo() {}";
        let first = cache.analyze(src, "foo.js");
        let second = cache.analyze(src, "foo.js");
        assert_eq!(first, second);
    }
}
