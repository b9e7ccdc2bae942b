//! Built-in structural scanner for SystemVerilog sources.
//!
//! Recognises design units, classes, subroutines, typedefs, covergroups,
//! imports and preprocessor directives. Statement bodies are skipped. It is
//! both the default [`PreProcessor`] and the default [`FileFactory`].

use crate::parsing::keywords::{is_directive, is_keyword, takes_line_argument};
use crate::parsing::lexer::{Lexer, Token, TokenKind};
use crate::parsing::{FileFactory, MacroContext, PreProcessor};
use crate::symbol::{SymbolItem, SymbolTree};
use crate::types::{ItemKind, Location, Marker, MarkerCategory};

#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralScanner;

impl StructuralScanner {
    pub fn new() -> Self {
        Self
    }
}

impl PreProcessor for StructuralScanner {
    fn preprocess(&self, content: &[u8], path: &str, _markers: &mut Vec<Marker>) -> Option<SymbolTree> {
        let text = String::from_utf8_lossy(content);
        let chars: Vec<char> = text.chars().collect();
        Some(PreProcPass::new(&chars).run(path))
    }
}

impl FileFactory for StructuralScanner {
    fn parse(
        &self,
        content: &[u8],
        path: &str,
        macros: &MacroContext,
        markers: &mut Vec<Marker>,
    ) -> Option<SymbolTree> {
        let text = String::from_utf8_lossy(content);
        let chars: Vec<char> = text.chars().collect();
        Some(ParsePass::new(&chars, macros.clone()).run(path, markers))
    }
}

/// Read the target of an `include directive.
fn read_include_target(lexer: &mut Lexer<'_>) -> Option<String> {
    let mut peek = lexer.clone();
    let tok = peek.next_token()?;
    match tok.kind {
        TokenKind::Str => {
            *lexer = peek;
            Some(tok.text)
        }
        TokenKind::Punct if tok.text == "<" => {
            *lexer = peek;
            Some(lexer.read_until('>').trim().to_string())
        }
        _ => None,
    }
}

/// Read the identifier argument of a conditional or `undef directive.
fn read_macro_name(lexer: &mut Lexer<'_>) -> Option<String> {
    let mut peek = lexer.clone();
    let tok = peek.next_token()?;
    if tok.kind == TokenKind::Ident {
        *lexer = peek;
        Some(tok.text)
    } else {
        None
    }
}

/// Structural pass: keeps every branch of every conditional.
struct PreProcPass<'a> {
    lexer: Lexer<'a>,
    conds: Vec<SymbolItem>,
    root: Vec<SymbolItem>,
}

impl<'a> PreProcPass<'a> {
    fn new(chars: &'a [char]) -> Self {
        Self {
            lexer: Lexer::new(chars),
            conds: Vec::new(),
            root: Vec::new(),
        }
    }

    fn push(&mut self, item: SymbolItem) {
        match self.conds.last_mut() {
            Some(cond) => cond.children.push(item),
            None => self.root.push(item),
        }
    }

    fn close_branch(&mut self) {
        if let Some(cond) = self.conds.pop() {
            self.push(cond);
        }
    }

    fn run(mut self, path: &str) -> SymbolTree {
        while let Some(tok) = self.lexer.next_token() {
            if tok.kind != TokenKind::Directive {
                continue;
            }
            let location = tok.location;
            match tok.text.as_str() {
                "include" => {
                    if let Some(target) = read_include_target(&mut self.lexer) {
                        self.push(SymbolItem::new(ItemKind::Include, target, location));
                    }
                }
                "define" => {
                    if let Some(name) = read_macro_name(&mut self.lexer) {
                        let body = self.lexer.rest_of_line();
                        self.push(SymbolItem::new(ItemKind::MacroDef, name, location).with_detail(body));
                    }
                }
                directive @ ("ifdef" | "ifndef" | "elsif") => {
                    let name = read_macro_name(&mut self.lexer).unwrap_or_default();
                    if directive == "elsif" {
                        self.close_branch();
                    }
                    self.conds.push(SymbolItem::new(
                        ItemKind::PreProcCond,
                        format!("{directive} {name}"),
                        location,
                    ));
                }
                "else" => {
                    self.close_branch();
                    self.conds.push(SymbolItem::new(ItemKind::PreProcCond, "else", location));
                }
                "endif" => self.close_branch(),
                other if takes_line_argument(other) => {
                    self.lexer.rest_of_line();
                }
                _ => {}
            }
        }
        while !self.conds.is_empty() {
            self.close_branch();
        }
        SymbolTree {
            path: path.to_string(),
            items: self.root,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Package,
    Module,
    Interface,
    Program,
    Class,
    Function,
    Task,
    Covergroup,
}

impl ScopeKind {
    fn item_kind(self) -> ItemKind {
        match self {
            ScopeKind::Package => ItemKind::PackageDecl,
            ScopeKind::Module => ItemKind::ModuleDecl,
            ScopeKind::Interface => ItemKind::InterfaceDecl,
            ScopeKind::Program => ItemKind::ProgramDecl,
            ScopeKind::Class => ItemKind::ClassDecl,
            ScopeKind::Function => ItemKind::Function,
            ScopeKind::Task => ItemKind::Task,
            ScopeKind::Covergroup => ItemKind::Covergroup,
        }
    }

    fn end_keyword(self) -> &'static str {
        match self {
            ScopeKind::Package => "endpackage",
            ScopeKind::Module => "endmodule",
            ScopeKind::Interface => "endinterface",
            ScopeKind::Program => "endprogram",
            ScopeKind::Class => "endclass",
            ScopeKind::Function => "endfunction",
            ScopeKind::Task => "endtask",
            ScopeKind::Covergroup => "endgroup",
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            ScopeKind::Package => "package",
            ScopeKind::Module => "module",
            ScopeKind::Interface => "interface",
            ScopeKind::Program => "program",
            ScopeKind::Class => "class",
            ScopeKind::Function => "function",
            ScopeKind::Task => "task",
            ScopeKind::Covergroup => "covergroup",
        }
    }

    fn from_end_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "endpackage" => ScopeKind::Package,
            "endmodule" => ScopeKind::Module,
            "endinterface" => ScopeKind::Interface,
            "endprogram" => ScopeKind::Program,
            "endclass" => ScopeKind::Class,
            "endfunction" => ScopeKind::Function,
            "endtask" => ScopeKind::Task,
            "endgroup" => ScopeKind::Covergroup,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Scope(ScopeKind),
    /// Active branch of a conditional, keyed by its `CondState::id`.
    Cond(u32),
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    item: SymbolItem,
}

#[derive(Debug)]
struct CondState {
    id: u32,
    parent_active: bool,
    taken: bool,
    active: bool,
}

/// Full pass: evaluates conditionals and builds the declaration tree.
struct ParsePass<'a> {
    lexer: Lexer<'a>,
    macros: MacroContext,
    conds: Vec<CondState>,
    frames: Vec<Frame>,
    root: Vec<SymbolItem>,
    markers: Vec<Marker>,
    next_cond_id: u32,
    prev_ident: Option<String>,
    /// `extern`, `pure`, `export` or a DPI import seen in the current statement.
    prototype: bool,
}

impl<'a> ParsePass<'a> {
    fn new(chars: &'a [char], macros: MacroContext) -> Self {
        Self {
            lexer: Lexer::new(chars),
            macros,
            conds: Vec::new(),
            frames: Vec::new(),
            root: Vec::new(),
            markers: Vec::new(),
            next_cond_id: 0,
            prev_ident: None,
            prototype: false,
        }
    }

    fn run(mut self, path: &str, markers: &mut Vec<Marker>) -> SymbolTree {
        while let Some(tok) = self.next_significant() {
            self.statement_token(tok);
        }
        self.finish();
        markers.append(&mut self.markers);
        SymbolTree {
            path: path.to_string(),
            items: self.root,
        }
    }

    fn active(&self) -> bool {
        self.conds.last().is_none_or(|c| c.active)
    }

    fn error(&mut self, category: MarkerCategory, message: String, location: Location) {
        self.markers.push(Marker::error(category, message).with_location(location));
    }

    /// Next token in an active region; directives are consumed on the way.
    fn next_significant(&mut self) -> Option<Token> {
        loop {
            let tok = self.lexer.next_token()?;
            if tok.kind == TokenKind::Directive {
                self.directive(tok);
                continue;
            }
            if self.active() {
                return Some(tok);
            }
        }
    }

    fn add_item(&mut self, item: SymbolItem) {
        match self.frames.last_mut() {
            Some(frame) => frame.item.children.push(item),
            None => self.root.push(item),
        }
    }

    fn pop_frame(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if matches!(frame.kind, FrameKind::Cond(_)) && frame.item.children.is_empty() {
            return;
        }
        self.add_item(frame.item);
    }

    fn open_cond_frame(&mut self, id: u32, label: String, location: Location) {
        self.frames.push(Frame {
            kind: FrameKind::Cond(id),
            item: SymbolItem::new(ItemKind::PreProcCond, label, location),
        });
    }

    /// Close the frame of a conditional branch. When scopes were opened
    /// inside the branch and are still open, the branch dissolves into its
    /// parent instead.
    fn close_cond_frame(&mut self, id: u32) {
        let Some(pos) = self.frames.iter().rposition(|f| f.kind == FrameKind::Cond(id)) else {
            return;
        };
        if pos + 1 == self.frames.len() {
            self.pop_frame();
            return;
        }
        let frame = self.frames.remove(pos);
        match pos.checked_sub(1).and_then(|i| self.frames.get_mut(i)) {
            Some(parent) => parent.item.children.extend(frame.item.children),
            None => self.root.extend(frame.item.children),
        }
    }

    fn directive(&mut self, tok: Token) {
        let location = tok.location;
        match tok.text.as_str() {
            directive @ ("ifdef" | "ifndef") => {
                let name = read_macro_name(&mut self.lexer).unwrap_or_default();
                let parent_active = self.active();
                let defined = self.macros.is_defined(&name);
                let active = parent_active && (defined == (directive == "ifdef"));
                let id = self.next_cond_id;
                self.next_cond_id += 1;
                self.conds.push(CondState {
                    id,
                    parent_active,
                    taken: active,
                    active,
                });
                if active {
                    self.open_cond_frame(id, format!("{directive} {name}"), location);
                }
            }
            directive @ ("elsif" | "else") => {
                let name = if directive == "elsif" {
                    read_macro_name(&mut self.lexer).unwrap_or_default()
                } else {
                    String::new()
                };
                let Some(state) = self.conds.last() else {
                    self.error(
                        MarkerCategory::ParseError,
                        format!("`{directive} without matching `ifdef"),
                        location,
                    );
                    return;
                };
                let (id, was_active) = (state.id, state.active);
                let enter = state.parent_active
                    && !state.taken
                    && (directive == "else" || self.macros.is_defined(&name));
                if was_active {
                    self.close_cond_frame(id);
                }
                if let Some(state) = self.conds.last_mut() {
                    state.active = enter;
                    state.taken |= enter;
                }
                if enter {
                    let label = if directive == "else" {
                        "else".to_string()
                    } else {
                        format!("elsif {name}")
                    };
                    self.open_cond_frame(id, label, location);
                }
            }
            "endif" => match self.conds.pop() {
                Some(state) => {
                    if state.active {
                        self.close_cond_frame(state.id);
                    }
                }
                None => self.error(
                    MarkerCategory::ParseError,
                    "`endif without matching `ifdef".to_string(),
                    location,
                ),
            },
            _ if !self.active() => {
                // Arguments of inactive directives are plain tokens and get skipped.
            }
            "define" => {
                if let Some(name) = read_macro_name(&mut self.lexer) {
                    let body = self.lexer.rest_of_line();
                    self.macros.define(name.clone(), body.clone());
                    self.add_item(SymbolItem::new(ItemKind::MacroDef, name, location).with_detail(body));
                }
            }
            "undef" => {
                if let Some(name) = read_macro_name(&mut self.lexer) {
                    self.macros.undefine(&name);
                }
            }
            "undefineall" => self.macros.clear(),
            "include" => {
                if let Some(target) = read_include_target(&mut self.lexer) {
                    self.add_item(SymbolItem::new(ItemKind::Include, target, location));
                }
            }
            other if takes_line_argument(other) => {
                self.lexer.rest_of_line();
            }
            other if is_directive(other) => {}
            other => {
                if !self.macros.is_defined(other) {
                    self.error(
                        MarkerCategory::UndefinedMacro,
                        format!("macro `{other} is undefined"),
                        location,
                    );
                }
            }
        }
    }

    fn statement_token(&mut self, tok: Token) {
        match tok.kind {
            TokenKind::Punct if tok.text == ";" => self.prototype = false,
            TokenKind::Ident => {
                self.keyword(&tok);
                self.prev_ident = Some(tok.text);
            }
            _ => {}
        }
    }

    fn keyword(&mut self, tok: &Token) {
        let location = tok.location;
        match tok.text.as_str() {
            "package" => self.open_scope(ScopeKind::Package, location),
            "module" | "macromodule" => self.open_scope(ScopeKind::Module, location),
            "program" => self.open_scope(ScopeKind::Program, location),
            "covergroup" => self.open_scope(ScopeKind::Covergroup, location),
            "interface" => {
                if self.prev_ident.as_deref() == Some("virtual") {
                    return;
                }
                let mut peek = self.lexer.clone();
                if peek.next_token().is_some_and(|t| t.is_ident("class")) {
                    self.lexer = peek;
                    self.open_class(location);
                } else {
                    self.open_scope(ScopeKind::Interface, location);
                }
            }
            "class" => self.open_class(location),
            "function" => self.subroutine(ScopeKind::Function, location),
            "task" => self.subroutine(ScopeKind::Task, location),
            "typedef" => self.typedef(location),
            "import" => {
                let mut peek = self.lexer.clone();
                if peek.next_token().is_some_and(|t| t.kind == TokenKind::Str) {
                    self.prototype = true;
                } else {
                    self.imports();
                }
            }
            "extern" | "pure" | "export" => self.prototype = true,
            word => {
                if let Some(kind) = ScopeKind::from_end_keyword(word) {
                    self.leave_scope(kind, location);
                }
            }
        }
    }

    /// First identifier that is not a reserved word. Stops at `;` or `(`.
    fn read_decl_name(&mut self) -> Option<Token> {
        let mut peek = self.lexer.clone();
        while let Some(tok) = peek.next_token() {
            match tok.kind {
                TokenKind::Ident if !is_keyword(&tok.text) => {
                    self.lexer = peek;
                    return Some(tok);
                }
                TokenKind::Ident => continue,
                _ => return None,
            }
        }
        None
    }

    fn push_scope(&mut self, kind: ScopeKind, name: String, location: Location) {
        self.frames.push(Frame {
            kind: FrameKind::Scope(kind),
            item: SymbolItem::new(kind.item_kind(), name, location),
        });
    }

    fn open_scope(&mut self, kind: ScopeKind, location: Location) {
        let name = match self.read_decl_name() {
            Some(tok) => tok.text,
            None => {
                self.error(
                    MarkerCategory::ParseError,
                    format!("expected a name after '{}'", kind.keyword()),
                    location,
                );
                String::new()
            }
        };
        self.push_scope(kind, name, location);
        self.skip_header(|_| {});
    }

    fn open_class(&mut self, location: Location) {
        let name = self.read_decl_name().map(|t| t.text).unwrap_or_default();
        self.push_scope(ScopeKind::Class, name, location);

        let mut base: Option<(String, Location)> = None;
        let mut in_extends = false;
        self.skip_header(|tok| {
            if tok.is_ident("extends") {
                in_extends = true;
                return;
            }
            if !in_extends {
                return;
            }
            match tok.kind {
                TokenKind::Ident => match &mut base {
                    Some((name, _)) if name.ends_with("::") => name.push_str(&tok.text),
                    Some(_) => in_extends = false,
                    None => base = Some((tok.text.clone(), tok.location)),
                },
                TokenKind::Punct if tok.text == "::" => {
                    if let Some((name, _)) = &mut base {
                        name.push_str("::");
                    }
                }
                _ => in_extends = false,
            }
        });

        if let Some((base, base_loc)) = base {
            if let Some(frame) = self.frames.last_mut() {
                frame.item.detail = Some(base.clone());
            }
            self.add_item(SymbolItem::new(ItemKind::Extends, base, base_loc));
        }
    }

    /// Skip to the `;` ending a declaration header, tracking nesting.
    fn skip_header(&mut self, mut observe: impl FnMut(&Token)) {
        let mut depth = 0usize;
        while let Some(tok) = self.next_significant() {
            if tok.kind == TokenKind::Punct {
                match tok.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    ";" if depth == 0 => return,
                    _ => {}
                }
            }
            if depth == 0 {
                observe(&tok);
            }
        }
    }

    fn subroutine(&mut self, kind: ScopeKind, location: Location) {
        let prototype = self.prototype || self.prev_ident.as_deref() == Some("with");
        let mut name: Option<String> = None;
        let mut depth = 0usize;
        let mut saw_ports = false;

        while let Some(tok) = self.next_significant() {
            match tok.kind {
                TokenKind::Punct => match tok.text.as_str() {
                    "[" => depth += 1,
                    "]" => depth = depth.saturating_sub(1),
                    "(" if depth == 0 => {
                        saw_ports = true;
                        break;
                    }
                    ";" if depth == 0 => break,
                    _ => {}
                },
                TokenKind::Ident if depth == 0 && !is_keyword(&tok.text) => {
                    name = Some(tok.text);
                }
                _ => {}
            }
        }
        if saw_ports {
            self.skip_header(|_| {});
        }
        self.prototype = false;

        let name = name.unwrap_or_default();
        if name.is_empty() {
            self.error(
                MarkerCategory::ParseError,
                format!("expected a name after '{}'", kind.keyword()),
                location,
            );
        }
        if prototype {
            self.add_item(SymbolItem::new(kind.item_kind(), name, location));
        } else {
            self.push_scope(kind, name, location);
        }
    }

    fn typedef(&mut self, location: Location) {
        let mut depth = 0usize;
        let mut name: Option<String> = None;
        while let Some(tok) = self.next_significant() {
            match tok.kind {
                TokenKind::Punct => match tok.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    ";" if depth == 0 => break,
                    _ => {}
                },
                TokenKind::Ident if depth == 0 && !is_keyword(&tok.text) => {
                    name = Some(tok.text);
                }
                _ => {}
            }
        }
        match name {
            Some(name) => self.add_item(SymbolItem::new(ItemKind::TypedefStmt, name, location)),
            None => self.error(
                MarkerCategory::ParseError,
                "typedef without a name".to_string(),
                location,
            ),
        }
    }

    /// `import a::b, c::*;`
    fn imports(&mut self) {
        let mut current: Option<(String, Location)> = None;
        while let Some(tok) = self.next_significant() {
            match tok.kind {
                TokenKind::Ident => match &mut current {
                    Some((name, _)) => name.push_str(&tok.text),
                    None => current = Some((tok.text, tok.location)),
                },
                TokenKind::Punct if tok.text == "::" || tok.text == "*" => {
                    if let Some((name, _)) = &mut current {
                        name.push_str(&tok.text);
                    }
                }
                TokenKind::Punct if tok.text == "," || tok.text == ";" => {
                    if let Some((name, location)) = current.take() {
                        self.add_item(SymbolItem::new(ItemKind::Import, name, location));
                    }
                    if tok.text == ";" {
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    fn leave_scope(&mut self, kind: ScopeKind, location: Location) {
        let target = self
            .frames
            .iter()
            .rposition(|f| f.kind == FrameKind::Scope(kind));
        let Some(target) = target else {
            self.error(
                MarkerCategory::ParseError,
                format!("unexpected '{}'", kind.end_keyword()),
                location,
            );
            return;
        };

        while self.frames.len() > target + 1 {
            if let Some(Frame {
                kind: FrameKind::Scope(inner),
                item,
            }) = self.frames.last()
            {
                let message = format!("missing '{}' for '{}'", inner.end_keyword(), item.name);
                self.error(MarkerCategory::ParseError, message, location);
            }
            self.pop_frame();
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.item.end_location = Some(location);
        }
        self.pop_frame();
    }

    fn finish(&mut self) {
        let eof = Location::new(self.lexer.line(), 1);
        while let Some(frame) = self.frames.last() {
            if let FrameKind::Scope(kind) = frame.kind {
                let message = format!("missing '{}' for '{}'", kind.end_keyword(), frame.item.name);
                let location = frame.item.location;
                self.error(MarkerCategory::ParseError, message, location);
            }
            self.pop_frame();
        }
        if !self.conds.is_empty() {
            self.error(
                MarkerCategory::ParseError,
                "missing `endif at end of file".to_string(),
                eof,
            );
        }
    }
}
