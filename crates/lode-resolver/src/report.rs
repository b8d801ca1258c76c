//! Rendering a failed resolution as a numbered chain of reasons.
//!
//! The derivation graph of the final incompatibility is walked depth
//! first. Every derived incompatibility becomes one "Because …, …." line;
//! lines referenced more than once get a number so later lines can point
//! back at them instead of repeating the whole derivation.

use std::collections::HashMap;

use crate::incompatibility::{Cause, IncompId, Incompatibility};

/// Explain why `failure` (an incompatibility for which `is_failure` holds)
/// was derived.
pub fn explain(arena: &[Incompatibility], failure: IncompId) -> String {
    let mut writer = Writer {
        arena,
        root: failure,
        derivations: HashMap::new(),
        lines: Vec::new(),
        line_numbers: HashMap::new(),
    };
    writer.count_derivations(failure);

    if arena[failure].is_derived() {
        writer.visit(failure, false);
    } else {
        writer.write(
            failure,
            format!("Because {}, version solving failed.", arena[failure]),
            false,
        );
    }
    writer.render()
}

struct Writer<'a> {
    arena: &'a [Incompatibility],
    root: IncompId,
    derivations: HashMap<IncompId, usize>,
    lines: Vec<(String, Option<usize>)>,
    line_numbers: HashMap<IncompId, usize>,
}

impl Writer<'_> {
    fn causes(&self, id: IncompId) -> Option<(IncompId, IncompId)> {
        match self.arena[id].cause() {
            Cause::Conflict(left, right) => Some((*left, *right)),
            _ => None,
        }
    }

    fn is_derived(&self, id: IncompId) -> bool {
        self.causes(id).is_some()
    }

    fn count_derivations(&mut self, id: IncompId) {
        let seen = self.derivations.entry(id).or_insert(0);
        *seen += 1;
        if *seen > 1 {
            return;
        }
        if let Some((left, right)) = self.causes(id) {
            self.count_derivations(left);
            self.count_derivations(right);
        }
    }

    fn write(&mut self, id: IncompId, message: String, numbered: bool) {
        if numbered {
            let number = self.line_numbers.len() + 1;
            self.line_numbers.insert(id, number);
            self.lines.push((message, Some(number)));
        } else {
            self.lines.push((message, None));
        }
    }

    /// `a (n) and b (m)`, with numbers where the line has one.
    fn and(&self, a: IncompId, b: IncompId) -> String {
        let mut out = self.arena[a].to_string();
        if let Some(n) = self.line_numbers.get(&a) {
            out.push_str(&format!(" ({n})"));
        }
        out.push_str(&format!(" and {}", self.arena[b]));
        if let Some(n) = self.line_numbers.get(&b) {
            out.push_str(&format!(" ({n})"));
        }
        out
    }

    fn visit(&mut self, id: IncompId, conclusion: bool) {
        let Some((left, right)) = self.causes(id) else {
            return;
        };
        let numbered = conclusion || self.derivations.get(&id).copied().unwrap_or(0) > 1;
        let conjunction = if conclusion || id == self.root { "So," } else { "And" };
        let text = self.arena[id].to_string();

        match (self.is_derived(left), self.is_derived(right)) {
            (true, true) => {
                let left_line = self.line_numbers.get(&left).copied();
                let right_line = self.line_numbers.get(&right).copied();
                match (left_line, right_line) {
                    (Some(_), Some(_)) => {
                        let message = format!("Because {}, {text}.", self.and(left, right));
                        self.write(id, message, numbered);
                    }
                    (Some(line), None) | (None, Some(line)) => {
                        let (with_line, without_line) = if left_line.is_some() {
                            (left, right)
                        } else {
                            (right, left)
                        };
                        self.visit(without_line, false);
                        let message = format!(
                            "{conjunction} because {} ({line}), {text}.",
                            self.arena[with_line]
                        );
                        self.write(id, message, numbered);
                    }
                    (None, None) => {
                        let single_left = self.is_single_line(left);
                        let single_right = self.is_single_line(right);
                        if single_left || single_right {
                            let (first, second) =
                                if single_right { (left, right) } else { (right, left) };
                            self.visit(first, false);
                            self.visit(second, false);
                            self.write(id, format!("Thus, {text}."), numbered);
                        } else {
                            self.visit(left, true);
                            self.lines.push((String::new(), None));
                            self.visit(right, false);
                            let line = self.line_numbers.get(&left).copied().unwrap_or_default();
                            let message = format!(
                                "{conjunction} because {} ({line}), {text}.",
                                self.arena[left]
                            );
                            self.write(id, message, numbered);
                        }
                    }
                }
            }
            (true, false) | (false, true) => {
                let (derived, external) = if self.is_derived(left) {
                    (left, right)
                } else {
                    (right, left)
                };
                if let Some(line) = self.line_numbers.get(&derived).copied() {
                    let message = format!(
                        "Because {} and {} ({line}), {text}.",
                        self.arena[external], self.arena[derived]
                    );
                    self.write(id, message, numbered);
                } else if let Some((inner_derived, inner_external)) = self.collapsible(derived) {
                    self.visit(inner_derived, false);
                    let message = format!(
                        "{conjunction} because {}, {text}.",
                        self.and(inner_external, external)
                    );
                    self.write(id, message, numbered);
                } else {
                    self.visit(derived, false);
                    let message =
                        format!("{conjunction} because {}, {text}.", self.arena[external]);
                    self.write(id, message, numbered);
                }
            }
            (false, false) => {
                let message = format!("Because {}, {text}.", self.and(left, right));
                self.write(id, message, numbered);
            }
        }
    }

    /// Both causes of `id` are external facts.
    fn is_single_line(&self, id: IncompId) -> bool {
        self.causes(id)
            .is_some_and(|(l, r)| !self.is_derived(l) && !self.is_derived(r))
    }

    /// A derivation used once, made of one derived and one external cause,
    /// can be folded into its parent's line. Returns `(derived, external)`.
    fn collapsible(&self, id: IncompId) -> Option<(IncompId, IncompId)> {
        if self.derivations.get(&id).copied().unwrap_or(0) > 1 {
            return None;
        }
        let (left, right) = self.causes(id)?;
        let (derived, external) = match (self.is_derived(left), self.is_derived(right)) {
            (true, false) => (left, right),
            (false, true) => (right, left),
            _ => return None,
        };
        (!self.line_numbers.contains_key(&derived)).then_some((derived, external))
    }

    fn render(&self) -> String {
        let padding = self
            .lines
            .iter()
            .filter_map(|(_, n)| *n)
            .max()
            .map(|n| format!("({n}) ").len())
            .unwrap_or(0);

        let mut out: Vec<String> = Vec::new();
        let mut last_was_empty = false;
        for (message, number) in &self.lines {
            if message.is_empty() {
                if !last_was_empty {
                    out.push(String::new());
                }
                last_was_empty = true;
                continue;
            }
            last_was_empty = false;
            let prefix = match number {
                Some(n) => format!("{:<padding$}", format!("({n})")),
                None => " ".repeat(padding),
            };
            out.push(format!("{prefix}{message}"));
        }
        out.join("\n")
    }
}
