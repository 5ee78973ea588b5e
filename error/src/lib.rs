//! Error types shared by every chao pass. An [`Error`] is built up through
//! its builder methods, accumulated (either in an [`ErrorHandler`] or by
//! aggregation into [`ErrKind::Multiple`]), and finally emitted on stderr
//! with its source context and hints.

use std::fmt::{Display, Formatter};

use colored::Colorize;

use location::{SourceOwned, SpanTuple};

pub mod log;

/// The role of the error handler is to keep track of errors and emit them
/// properly once done
#[derive(Default)]
pub struct ErrorHandler {
    errors: Vec<Error>,
}

impl ErrorHandler {
    /// Emit all the errors contained in a handler
    pub fn emit(&self) {
        if let Some(first_err) = self.errors.first() {
            first_err.emit();
        }
        self.errors.iter().skip(1).for_each(|e| {
            eprintln!();
            e.emit()
        });
    }

    /// Add a new error to the handler
    pub fn add(&mut self, err: Error) {
        self.errors.push(err)
    }

    /// Drains all the errors contained in another handler in order to
    /// accumulate them in one place
    pub fn append(&mut self, other: &mut ErrorHandler) {
        self.errors.append(&mut other.errors)
    }

    /// Remove all the errors contained in the handler
    pub fn clear(&mut self) {
        self.errors.clear()
    }

    /// Has the error handler seen errors or not
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Diagnostic classes. Passes pick the most precise kind available;
/// [`ErrKind::Multiple`] folds a batch of independent errors into one so
/// that a pass can report everything it found in a single [`Error`].
#[derive(Clone, Debug, PartialEq)]
pub enum ErrKind {
    Hint,
    NameResolution,
    TypeChecker,
    Generics,
    UnknownCapability,
    UnboundTypeParameter,
    UnsatisfiedConstraint,
    RecursiveInstantiation,
    PossiblyNullValue,
    MutationDuringIteration,
    IndexOutOfBounds,
    Interpreter,
    Multiple(Vec<Error>),
}

impl ErrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrKind::Hint => "hint",
            ErrKind::NameResolution => "name resolution",
            ErrKind::TypeChecker => "typechecker",
            ErrKind::Generics => "generics",
            ErrKind::UnknownCapability => "unknown capability",
            ErrKind::UnboundTypeParameter => "unbound type parameter",
            ErrKind::UnsatisfiedConstraint => "unsatisfied constraint",
            ErrKind::RecursiveInstantiation => "recursive instantiation",
            ErrKind::PossiblyNullValue => "use of possibly-null value",
            ErrKind::MutationDuringIteration => "mutation during iteration",
            ErrKind::IndexOutOfBounds => "index out of bounds",
            ErrKind::Interpreter => "interpreter",
            ErrKind::Multiple(_) => "multiple errors",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Error {
    kind: ErrKind,
    msg: Option<String>,
    loc: Option<SpanTuple>,
    hints: Vec<Error>,
}

fn get_path_str(loc: &SpanTuple) -> String {
    match loc.source() {
        SourceOwned::Path(p) => format!("{}", p.display()),
        SourceOwned::Input(_) => String::from("<source>"),
        SourceOwned::Empty => String::from("<?>"),
    }
}

impl Error {
    fn emit_full_loc(&self, loc: &SpanTuple) {
        let (before_ctx, after_ctx) = loc.generate_context();
        let path = get_path_str(loc);

        if let Some(msg) = &self.msg {
            eprintln!(
                "{}: {}:{}:{}: {}",
                "error".black().on_yellow(),
                path.yellow(),
                loc.start().line(),
                loc.start().column(),
                msg
            );
            eprintln!();
        }

        if let Some(ctx) = before_ctx {
            ctx.emit('|', '_')
        };
        loc.emit(">".red().bold(), "^".purple());
        after_ctx.emit('|', '_');
    }

    fn emit_hint(&self) {
        eprintln!();
        eprint!("{}: ", "hint".black().on_green());
        if let Some(loc) = &self.loc {
            let path = get_path_str(loc);
            eprint!(
                "{}:{}:{}: ",
                path.green(),
                loc.start().line(),
                loc.start().column()
            );
        }
        if let Some(msg) = &self.msg {
            eprintln!("{msg}");
        }
        eprintln!();

        if let Some(loc) = &self.loc {
            loc.emit("|".green(), "^".green());
        }
    }

    pub fn emit(&self) {
        // A batch emits each inner error on its own, like a handler would
        if let ErrKind::Multiple(errs) = &self.kind {
            if let Some(first_err) = errs.first() {
                first_err.emit();
            }
            errs.iter().skip(1).for_each(|e| {
                eprintln!();
                e.emit()
            });

            return;
        }

        if let Some(loc) = &self.loc {
            self.emit_full_loc(loc);
        } else if let Some(msg) = &self.msg {
            eprintln!("{}: {}", "error".black().on_yellow(), msg)
        }

        if let Some(first_hint) = self.hints.first() {
            first_hint.emit_hint();
        }

        self.hints.iter().skip(1).for_each(|hint| hint.emit_hint());
    }

    pub fn new(kind: ErrKind) -> Error {
        Error {
            kind,
            msg: None,
            loc: None,
            hints: vec![],
        }
    }

    pub fn hint() -> Error {
        Error::new(ErrKind::Hint)
    }

    pub fn with_msg(self, msg: String) -> Error {
        Error {
            msg: Some(msg),
            ..self
        }
    }

    pub fn with_loc(self, loc: Option<SpanTuple>) -> Error {
        Error { loc, ..self }
    }

    // Add a hint to emit alongside the error
    pub fn with_hint(self, hint: Error) -> Error {
        let mut new_hints = self.hints;
        new_hints.push(hint);

        Error {
            hints: new_hints,
            ..self
        }
    }

    pub fn kind(&self) -> &ErrKind {
        &self.kind
    }

    pub fn msg(&self) -> Option<&str> {
        self.msg.as_deref()
    }

    pub fn loc(&self) -> Option<&SpanTuple> {
        self.loc.as_ref()
    }

    /// Flatten a batch: an [`ErrKind::Multiple`] error yields its children,
    /// anything else yields itself. Useful for tests and callers which want
    /// to inspect each diagnostic individually.
    pub fn flatten(self) -> Vec<Error> {
        match self.kind {
            ErrKind::Multiple(errs) => errs.into_iter().flat_map(Error::flatten).collect(),
            _ => vec![self],
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(msg) = &self.msg {
            write!(f, ": {msg}")?;
        }

        if let Some(loc) = &self.loc {
            write!(
                f,
                " at line {} column {}",
                loc.start().line(),
                loc.start().column()
            )?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_everything() {
        let err = Error::new(ErrKind::TypeChecker)
            .with_msg(String::from("mismatched types"))
            .with_hint(Error::hint().with_msg(String::from("declared here")));

        assert_eq!(err.kind(), &ErrKind::TypeChecker);
        assert_eq!(err.msg(), Some("mismatched types"));
        assert_eq!(err.hints.len(), 1);
    }

    #[test]
    fn flatten_unnests_batches() {
        let batch = Error::new(ErrKind::Multiple(vec![
            Error::new(ErrKind::NameResolution),
            Error::new(ErrKind::Multiple(vec![Error::new(ErrKind::TypeChecker)])),
        ]));

        let flat = batch.flatten();

        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].kind(), &ErrKind::NameResolution);
        assert_eq!(flat[1].kind(), &ErrKind::TypeChecker);
    }

    #[test]
    fn display_mentions_kind_and_msg() {
        let err = Error::new(ErrKind::IndexOutOfBounds).with_msg(String::from("index 6 on 5 elements"));

        assert_eq!(format!("{err}"), "index out of bounds: index 6 on 5 elements");
    }
}
