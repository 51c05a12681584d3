//! Pending edits to one source file
//!
//! Edits are byte-range splices over the original text. Every edit becomes a
//! marked region in the output. Edits are recorded children-first, so when an
//! outer node is replaced its rendered text already contains the edits made
//! inside it; the outer replacement then supersedes them. `orig` in a region
//! marker is always a slice of the original text.

use std::ops::Range;

use weft_parser::markers::{line_directive, wrap_region};
use weft_parser::MarkerAttrs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Empty for insertions.
    pub range: Range<usize>,
    pub attrs: MarkerAttrs,
    pub body: String,
    seq: usize,
}

impl Edit {
    pub fn is_insert(&self) -> bool {
        self.range.is_empty()
    }
}

/// Why an edit was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub with: MarkerAttrs,
}

pub struct EditSet<'s> {
    text: &'s str,
    /// File name written into `/*line*/` directives.
    line_path: String,
    edits: Vec<Edit>,
    next_seq: usize,
}

impl<'s> EditSet<'s> {
    pub fn new(text: &'s str, line_path: impl Into<String>) -> Self {
        Self {
            text,
            line_path: line_path.into(),
            edits: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    /// Whether an edit of this aspect and kind has been recorded anywhere.
    pub fn contains(&self, aspect: &str, kind: &str) -> bool {
        self.edits
            .iter()
            .any(|e| e.attrs.aspect == aspect && e.attrs.kind == kind)
    }

    /// Whether an insertion of this aspect and kind is pending at `at`.
    pub fn has_insert_at(&self, at: usize, aspect: &str, kind: &str) -> bool {
        self.edits.iter().any(|e| {
            e.is_insert() && e.range.start == at && e.attrs.aspect == aspect && e.attrs.kind == kind
        })
    }

    /// Original text of `range` with the pending edits inside it applied.
    /// Insertions on the boundary belong to the surroundings and are left out.
    pub fn render_range(&self, range: Range<usize>) -> String {
        let inner: Vec<&Edit> = self
            .sorted()
            .into_iter()
            .filter(|e| {
                if e.is_insert() {
                    range.start < e.range.start && e.range.start < range.end
                } else {
                    range.start <= e.range.start && e.range.end <= range.end
                }
            })
            .collect();
        self.splice(range, &inner)
    }

    pub fn insert(&mut self, at: usize, attrs: MarkerAttrs, body: String) -> Result<(), Conflict> {
        if let Some(e) = self
            .edits
            .iter()
            .find(|e| !e.is_insert() && e.range.start < at && at < e.range.end)
        {
            return Err(Conflict {
                with: e.attrs.clone(),
            });
        }
        self.push(at..at, attrs, body);
        Ok(())
    }

    /// Replace `range`; `body` must already contain whatever pending edits
    /// inside the range it wants to keep (see `render_range`).
    pub fn replace(
        &mut self,
        range: Range<usize>,
        attrs: MarkerAttrs,
        body: String,
    ) -> Result<(), Conflict> {
        for e in &self.edits {
            if e.is_insert() {
                continue;
            }
            let nested_inside_new = range.start <= e.range.start && e.range.end <= range.end;
            let disjoint = e.range.end <= range.start || range.end <= e.range.start;
            if !nested_inside_new && !disjoint {
                return Err(Conflict {
                    with: e.attrs.clone(),
                });
            }
        }

        self.edits.retain(|e| {
            if e.is_insert() {
                !(range.start < e.range.start && e.range.start < range.end)
            } else {
                !(range.start <= e.range.start && e.range.end <= range.end)
            }
        });
        let attrs = attrs.with_orig(&self.text[range.clone()]);
        self.push(range, attrs, body);
        Ok(())
    }

    /// Replace `range` with a region that carries no `orig`: unweaving
    /// removes it entirely. Used for regions this tool generated itself.
    pub fn regenerate(
        &mut self,
        range: Range<usize>,
        attrs: MarkerAttrs,
        body: String,
    ) -> Result<(), Conflict> {
        self.replace(range.clone(), attrs, body)?;
        if let Some(edit) = self.edits.last_mut() {
            edit.attrs.orig = None;
        }
        Ok(())
    }

    /// The whole file with every edit applied.
    pub fn apply(&self) -> String {
        let all: Vec<&Edit> = self.sorted();
        self.splice(0..self.text.len(), &all)
    }

    fn push(&mut self, range: Range<usize>, attrs: MarkerAttrs, body: String) {
        self.edits.push(Edit {
            range,
            attrs,
            body,
            seq: self.next_seq,
        });
        self.next_seq += 1;
    }

    fn sorted(&self) -> Vec<&Edit> {
        let mut edits: Vec<&Edit> = self.edits.iter().collect();
        edits.sort_by_key(|e| (e.range.start, !e.is_insert(), e.seq));
        edits
    }

    fn splice(&self, range: Range<usize>, edits: &[&Edit]) -> String {
        let mut out = String::with_capacity(range.len());
        let mut cursor = range.start;
        for edit in edits {
            out.push_str(&self.text[cursor..edit.range.start]);
            out.push_str(&self.region_text(edit));
            cursor = edit.range.end;
        }
        out.push_str(&self.text[cursor..range.end]);
        out
    }

    fn region_text(&self, edit: &Edit) -> String {
        let resume = edit.range.end;
        let directive = if edit.body.contains('\n') && resume < self.text.len() {
            let (line, col) = self.line_col(resume);
            Some(line_directive(&self.line_path, line, col))
        } else {
            None
        };
        wrap_region(&edit.attrs, &edit.body, directive.as_deref())
    }

    fn line_col(&self, offset: usize) -> (usize, usize) {
        let before = &self.text[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        (line, offset - line_start + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn attrs(kind: &str, aspect: &str) -> MarkerAttrs {
        MarkerAttrs::new(kind, aspect)
    }

    #[test]
    fn test_outer_replace_supersedes_inner() {
        let text = "x := f(g(1))\n";
        let mut edits = EditSet::new(text, "main.go");

        let inner = 7..11;
        assert_eq!(&text[inner.clone()], "g(1)");
        edits
            .replace(inner, attrs("wrap-expression", "a"), "wg(g(1))".to_string())
            .unwrap();

        let outer = 5..12;
        let expr = edits.render_range(outer.clone());
        assert!(expr.starts_with("f(/*weft:begin kind=wrap-expression aspect=a orig=g(1)*/"));
        edits
            .replace(outer, attrs("wrap-expression", "b"), format!("wf({})", expr))
            .unwrap();

        assert_eq!(edits.edits().len(), 1);
        let out = edits.apply();
        assert!(out.starts_with("x := /*weft:begin kind=wrap-expression aspect=b orig=f(g(1))*/wf(f("));
        assert!(out.ends_with("/*weft:end*/))/*weft:end*/\n"));
    }

    #[test]
    fn test_inserts_keep_order_and_boundaries() {
        let text = "func f() {\n\twork()\n}\n";
        let mut edits = EditSet::new(text, "main.go");
        let at = text.find('{').unwrap() + 1;
        edits
            .insert(at, attrs("prepend-statements", "a"), "a(); ".into())
            .unwrap();
        edits
            .insert(at, attrs("prepend-statements", "b"), "b(); ".into())
            .unwrap();
        assert!(edits.has_insert_at(at, "b", "prepend-statements"));
        assert!(!edits.has_insert_at(at, "c", "prepend-statements"));

        assert_eq!(
            edits.apply(),
            "func f() {/*weft:begin kind=prepend-statements aspect=a*/a(); /*weft:end*/\
             /*weft:begin kind=prepend-statements aspect=b*/b(); /*weft:end*/\n\twork()\n}\n"
        );
    }

    #[test]
    fn test_multiline_body_restores_position() {
        let text = "package p\n\nvar x = f()\n";
        let mut edits = EditSet::new(text, "/src/p/x.go");
        let start = text.find("f()").unwrap();
        edits
            .replace(start..start + 3, attrs("wrap-expression", "a"), "g(\n\tf(),\n)".into())
            .unwrap();
        assert!(edits.apply().ends_with("/*weft:end*//*line /src/p/x.go:3:12*/\n"));
    }

    #[test]
    fn test_regenerated_region_has_no_orig() {
        let text = "package p; /*weft:begin kind=imports aspect=weft*/import (a \"x\")/*weft:end*/\n";
        let start = text.find("/*weft:begin").unwrap();
        let end = text.find('\n').unwrap();
        let mut edits = EditSet::new(text, "p.go");
        edits
            .regenerate(start..end, attrs("imports", "weft"), "import (a \"x\"; b \"y\")".into())
            .unwrap();
        assert_eq!(
            edits.apply(),
            "package p; /*weft:begin kind=imports aspect=weft*/import (a \"x\"; b \"y\")/*weft:end*/\n"
        );
    }

    #[test]
    fn test_partial_overlap_conflicts() {
        let text = "abcdefgh";
        let mut edits = EditSet::new(text, "x.go");
        edits.replace(1..4, attrs("k", "a"), "X".into()).unwrap();
        assert!(edits.replace(3..6, attrs("k", "b"), "Y".into()).is_err());
        assert!(edits.insert(2, attrs("k", "c"), "Z".into()).is_err());
        assert!(edits.insert(4, attrs("k", "c"), "Z".into()).is_ok());
    }
}
