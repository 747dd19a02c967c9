//! Class checks: constructors leaving members uninitialized, missing
//! virtual destructors, suspicious `operator=` signatures, and private
//! functions nothing ever calls.

use crate::check::Check;
use crate::errorlogger::{ErrorLogger, ErrorMessage, Severity};
use crate::settings::Settings;
use crate::token::{TokenId, TokenKind, TokenList};

struct Method {
    name: String,
    tok: TokenId,
    is_virtual: bool,
    is_private: bool,
    is_ctor: bool,
    is_dtor: bool,
    body_open: Option<TokenId>,
}

struct ClassInfo {
    name: String,
    name_tok: TokenId,
    members: Vec<String>,
    methods: Vec<Method>,
}

fn collect_classes(list: &TokenList) -> Vec<ClassInfo> {
    let mut classes = Vec::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        cur = list.next(id);
        let keyword = list.str_of(id);
        if keyword != "class" && keyword != "struct" {
            continue;
        }
        let Some(name_tok) = list.next(id) else { continue };
        if list.kind(name_tok) != TokenKind::Name {
            continue;
        }
        // skip base-class clause up to the body
        let mut open = list.next(name_tok);
        let mut steps = 0;
        while let Some(t) = open {
            steps += 1;
            if steps > 30 || list.is_str(t, ";") {
                open = None;
                break;
            }
            if list.is_str(t, "{") {
                break;
            }
            open = list.next(t);
        }
        let Some(body_open) = open else { continue };
        let Some(body_close) = list.link(body_open) else { continue };
        if let Some(info) = parse_class_body(list, name_tok, body_open, body_close, keyword == "class")
        {
            classes.push(info);
        }
        cur = list.next(body_close);
    }
    classes
}

fn parse_class_body(
    list: &TokenList,
    name_tok: TokenId,
    body_open: TokenId,
    body_close: TokenId,
    default_private: bool,
) -> Option<ClassInfo> {
    let class_name = list.str_of(name_tok).to_string();
    let mut members = Vec::new();
    let mut methods = Vec::new();
    let mut private = default_private;
    let mut pending_virtual = false;

    let mut cur = list.next(body_open);
    while let Some(id) = cur {
        if id == body_close {
            break;
        }
        let text = list.str_of(id);
        match text {
            "public" | "protected" | "private" => {
                if list.next(id).map(|n| list.is_str(n, ":")) == Some(true) {
                    private = text == "private";
                    cur = list.advance(id, 2);
                    continue;
                }
            }
            "virtual" => {
                pending_virtual = true;
                cur = list.next(id);
                continue;
            }
            ";" => {
                pending_virtual = false;
                cur = list.next(id);
                continue;
            }
            "~" => {
                // destructor
                let Some(dtor_name) = list.next(id) else { break };
                let after = skip_method_signature(list, dtor_name);
                methods.push(Method {
                    name: format!("~{}", list.str_of(dtor_name)),
                    tok: id,
                    is_virtual: pending_virtual,
                    is_private: private,
                    is_ctor: false,
                    is_dtor: true,
                    body_open: after.0,
                });
                pending_virtual = false;
                cur = after.1;
                continue;
            }
            "operator" => {
                let Some(op) = list.next(id) else { break };
                let after = skip_method_signature(list, op);
                methods.push(Method {
                    name: format!("operator{}", list.str_of(op)),
                    tok: id,
                    is_virtual: pending_virtual,
                    is_private: private,
                    is_ctor: false,
                    is_dtor: false,
                    body_open: after.0,
                });
                pending_virtual = false;
                cur = after.1;
                continue;
            }
            _ => {}
        }

        // method: name followed by ( at class scope
        if list.kind(id) == TokenKind::Name
            && list.next(id).map(|n| list.is_str(n, "(")) == Some(true)
        {
            let after = skip_method_signature(list, id);
            methods.push(Method {
                name: list.str_of(id).to_string(),
                tok: id,
                is_virtual: pending_virtual,
                is_private: private,
                is_ctor: list.str_of(id) == class_name,
                is_dtor: false,
                body_open: after.0,
            });
            pending_virtual = false;
            cur = after.1;
            continue;
        }

        // member variable: type [*] name ; (static members init elsewhere)
        let static_member = list
            .prev(id)
            .map(|p| list.is_str(p, "static"))
            .unwrap_or(false);
        if list.kind(id) == TokenKind::Type && !static_member {
            let mut t = list.next(id);
            while let Some(x) = t {
                if list.is_str(x, "*") || list.is_str(x, "&") || list.kind(x) == TokenKind::Type {
                    t = list.next(x);
                } else {
                    break;
                }
            }
            if let Some(name) = t {
                if list.kind(name) == TokenKind::Name
                    && list.next(name).map(|n| list.is_str(n, ";")) == Some(true)
                {
                    members.push(list.str_of(name).to_string());
                    cur = list.advance(name, 2);
                    continue;
                }
            }
        }

        cur = list.next(id);
    }

    Some(ClassInfo {
        name: class_name,
        name_tok,
        members,
        methods,
    })
}

/// From the method name token, skip `( params )` and any trailing
/// qualifiers. Returns (body `{` if defined inline, token after the whole
/// declaration).
fn skip_method_signature(list: &TokenList, name_tok: TokenId) -> (Option<TokenId>, Option<TokenId>) {
    let Some(open) = list.next(name_tok) else { return (None, None) };
    if !list.is_str(open, "(") {
        return (None, list.next(name_tok));
    }
    let Some(close) = list.link(open) else { return (None, None) };
    let mut cur = list.next(close);
    let mut steps = 0;
    while let Some(id) = cur {
        steps += 1;
        if steps > 40 {
            return (None, Some(id));
        }
        match list.str_of(id) {
            ";" => return (None, list.next(id)),
            "{" => {
                let end = list.link(id);
                return (Some(id), end.and_then(|e| list.next(e)));
            }
            _ => cur = list.next(id),
        }
    }
    (None, None)
}

pub struct ClassCheck;

impl ClassCheck {
    pub fn new() -> Self {
        ClassCheck
    }

    /// Members assigned by a constructor: init-list entries plus plain
    /// `name = ...` and `this->name = ...` statements in the body. The bool
    /// is true when the body calls out to other functions, which makes any
    /// missing-member finding lower-confidence.
    fn ctor_initialized_members(list: &TokenList, ctor: &Method) -> Option<(Vec<String>, bool)> {
        let body_open = ctor.body_open?;
        let body_close = list.link(body_open)?;
        let mut assigned = Vec::new();

        // init list sits between the parameter `)` and the `{`
        let param_open = list.next(ctor.tok)?;
        if list.is_str(param_open, "(") {
            let mut cur = list.link(param_open).and_then(|c| list.next(c));
            while let Some(id) = cur {
                if id == body_open {
                    break;
                }
                if list.kind(id) == TokenKind::Name
                    && list.next(id).map(|n| list.is_str(n, "(")) == Some(true)
                {
                    assigned.push(list.str_of(id).to_string());
                    cur = list.next(id).and_then(|o| list.link(o)).and_then(|c| list.next(c));
                    continue;
                }
                cur = list.next(id);
            }
        }

        let mut calls_out = false;
        let mut cur = list.next(body_open);
        while let Some(id) = cur {
            if id == body_close {
                break;
            }
            let text = list.str_of(id);
            if text == "memset" || text == "memcpy" {
                // bulk initialization: assume everything is covered
                return None;
            }
            if list.kind(id) == TokenKind::Name
                && list.next(id).map(|n| list.is_str(n, "(")) == Some(true)
            {
                calls_out = true;
            }
            if list.kind(id) == TokenKind::Name
                && list.next(id).map(|n| list.is_str(n, "=")) == Some(true)
            {
                assigned.push(text.to_string());
            }
            cur = list.next(id);
        }
        Some((assigned, calls_out))
    }

    fn check_constructors(
        &self,
        list: &TokenList,
        class: &ClassInfo,
        settings: &Settings,
        logger: &mut dyn ErrorLogger,
    ) {
        if !settings.severity_enabled(Severity::Warning) {
            return;
        }
        for ctor in class.methods.iter().filter(|m| m.is_ctor) {
            let Some((assigned, calls_out)) = Self::ctor_initialized_members(list, ctor) else {
                continue;
            };
            // a helper call may initialize members behind our back
            if calls_out && !settings.inconclusive {
                continue;
            }
            for member in &class.members {
                if !assigned.contains(member) {
                    logger.report_err(&ErrorMessage::at(
                        Severity::Warning,
                        "uninitMemberVar",
                        &format!(
                            "Member variable '{}::{}' is not initialized in the constructor.",
                            class.name, member
                        ),
                        list.file_of(ctor.tok),
                        list.get(ctor.tok).line,
                    ));
                }
            }
        }
    }

    fn check_virtual_destructor(
        &self,
        list: &TokenList,
        class: &ClassInfo,
        logger: &mut dyn ErrorLogger,
    ) {
        let has_virtual = class.methods.iter().any(|m| m.is_virtual && !m.is_dtor);
        if !has_virtual {
            return;
        }
        let dtor_virtual = class
            .methods
            .iter()
            .find(|m| m.is_dtor)
            .map(|m| m.is_virtual)
            .unwrap_or(false);
        if !dtor_virtual {
            logger.report_err(&ErrorMessage::at(
                Severity::Error,
                "virtualDestructor",
                &format!(
                    "Class '{}' which has virtual members does not have a virtual destructor.",
                    class.name
                ),
                list.file_of(class.name_tok),
                list.get(class.name_tok).line,
            ));
        }
    }

    fn check_operator_eq(
        &self,
        list: &TokenList,
        class: &ClassInfo,
        settings: &Settings,
        logger: &mut dyn ErrorLogger,
    ) {
        if !settings.severity_enabled(Severity::Style) {
            return;
        }
        for method in class.methods.iter().filter(|m| m.name == "operator=") {
            // well-formed: `ClassName & operator = (`
            let amp = list.prev(method.tok);
            let ret = amp.and_then(|a| list.prev(a));
            let good = match (amp, ret) {
                (Some(a), Some(r)) => {
                    list.is_str(a, "&") && list.str_of(r) == class.name
                }
                _ => false,
            };
            if !good {
                logger.report_err(&ErrorMessage::at(
                    Severity::Style,
                    "operatorEq",
                    "'operator=' should return reference to self",
                    list.file_of(method.tok),
                    list.get(method.tok).line,
                ));
            }
        }
    }

    fn check_unused_private(
        &self,
        list: &TokenList,
        class: &ClassInfo,
        settings: &Settings,
        logger: &mut dyn ErrorLogger,
    ) {
        if !settings.severity_enabled(Severity::Style) {
            return;
        }
        for method in class
            .methods
            .iter()
            .filter(|m| m.is_private && !m.is_ctor && !m.is_dtor && !m.name.starts_with("operator"))
        {
            let mut used = false;
            for id in list.ids() {
                if id == method.tok {
                    continue;
                }
                if list.kind(id) != TokenKind::Name || !list.is_str(id, &method.name) {
                    continue;
                }
                let next_is_call =
                    list.next(id).map(|n| list.is_str(n, "(")) == Some(true);
                let qualified_definition = list
                    .prev(id)
                    .map(|p| list.is_str(p, "::"))
                    .unwrap_or(false);
                if next_is_call && !qualified_definition {
                    used = true;
                    break;
                }
            }
            if !used {
                logger.report_err(&ErrorMessage::at(
                    Severity::Style,
                    "unusedPrivateFunction",
                    &format!("Unused private function: '{}::{}'", class.name, method.name),
                    list.file_of(method.tok),
                    list.get(method.tok).line,
                ));
            }
        }
    }
}

impl Default for ClassCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl Check for ClassCheck {
    fn name(&self) -> &'static str {
        "Classes"
    }

    fn run(&mut self, list: &TokenList, settings: &Settings, logger: &mut dyn ErrorLogger) {
        for class in collect_classes(list) {
            if settings.is_terminated() {
                return;
            }
            self.check_constructors(list, &class, settings, logger);
            self.check_virtual_destructor(list, &class, logger);
            self.check_operator_eq(list, &class, settings, logger);
            self.check_unused_private(list, &class, settings, logger);
        }
    }

    fn report_examples(&self, logger: &mut dyn ErrorLogger) {
        logger.report_err(&ErrorMessage::bare(
            Severity::Warning,
            "uninitMemberVar",
            "Member variable 'Foo::x' is not initialized in the constructor.",
        ));
        logger.report_err(&ErrorMessage::bare(
            Severity::Error,
            "virtualDestructor",
            "Class 'Base' which has virtual members does not have a virtual destructor.",
        ));
        logger.report_err(&ErrorMessage::bare(
            Severity::Style,
            "operatorEq",
            "'operator=' should return reference to self",
        ));
        logger.report_err(&ErrorMessage::bare(
            Severity::Style,
            "unusedPrivateFunction",
            "Unused private function: 'Foo::helper'",
        ));
    }
}
