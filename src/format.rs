// Printf-style formatter front-end
//
// Walks a template string, copying literal bytes into the output buffer and
// delegating each `%` specifier to the matching argument's formatter.
// Integer formatters honour `d`; floats render with six fractional digits
// under `d`; chars and strings honour `s`. A doubled `%%` collapses to one
// `%`. Formatting runs on the output thread via the dispatch protocol.

use crate::error::OutputError;
use crate::frame::Render;
use crate::output::OutputBuffer;

/// One value that knows how to consume a conversion specifier.
///
/// `format` inspects the specifier at the front of `spec` and, if it
/// handles it, writes the value and advances `spec` past the specifier.
/// Returns `Ok(false)` for an unhandled specifier, leaving `spec` alone.
pub trait Format {
    fn format(&self, out: &mut OutputBuffer, spec: &mut &str) -> Result<bool, OutputError>;
}

macro_rules! int_format_impls {
    ($($ty:ty),*) => {$(
        impl Format for $ty {
            fn format(&self, out: &mut OutputBuffer, spec: &mut &str) -> Result<bool, OutputError> {
                let current = *spec;
                match current.as_bytes().first() {
                    Some(b'd') => {
                        out.write_bytes(self.to_string().as_bytes())?;
                        *spec = &current[1..];
                        Ok(true)
                    }
                    // `x` and `b` are reserved for hex and binary output
                    // but are not implemented yet.
                    _ => Ok(false),
                }
            }
        }
    )*};
}

int_format_impls!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

macro_rules! float_format_impls {
    ($($ty:ty),*) => {$(
        impl Format for $ty {
            fn format(&self, out: &mut OutputBuffer, spec: &mut &str) -> Result<bool, OutputError> {
                let current = *spec;
                match current.as_bytes().first() {
                    Some(b'd') => {
                        out.write_bytes(format!("{:.6}", self).as_bytes())?;
                        *spec = &current[1..];
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
        }
    )*};
}

float_format_impls!(f32, f64);

impl Format for char {
    fn format(&self, out: &mut OutputBuffer, spec: &mut &str) -> Result<bool, OutputError> {
        let current = *spec;
        match current.as_bytes().first() {
            Some(b's') => {
                let mut utf8 = [0u8; 4];
                out.write_bytes(self.encode_utf8(&mut utf8).as_bytes())?;
                *spec = &current[1..];
                Ok(true)
            }
            // Fall back to the character's numeric value.
            _ => u32::from(*self).format(out, spec),
        }
    }
}

impl Format for &str {
    fn format(&self, out: &mut OutputBuffer, spec: &mut &str) -> Result<bool, OutputError> {
        let current = *spec;
        match current.as_bytes().first() {
            Some(b's') => {
                out.write_bytes(self.as_bytes())?;
                *spec = &current[1..];
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Format for String {
    fn format(&self, out: &mut OutputBuffer, spec: &mut &str) -> Result<bool, OutputError> {
        self.as_str().format(out, spec)
    }
}

/// Copy literal text up to the next specifier, collapsing `%%`. Returns the
/// remainder immediately after the `%`, or `None` once the template is
/// exhausted.
pub(crate) fn next_specifier<'a>(
    out: &mut OutputBuffer,
    mut format: &'a str,
) -> Result<Option<&'a str>, OutputError> {
    loop {
        match format.find('%') {
            None => {
                out.write_bytes(format.as_bytes())?;
                return Ok(None);
            }
            Some(idx) => {
                out.write_bytes(format[..idx].as_bytes())?;
                format = &format[idx + 1..];
                if format.as_bytes().first() == Some(&b'%') {
                    out.write_bytes(b"%")?;
                    format = &format[1..];
                } else {
                    return Ok(Some(format));
                }
            }
        }
    }
}

/// Copy the rest of the template. Specifiers with no argument left are
/// reproduced verbatim.
fn finish_template(out: &mut OutputBuffer, mut format: &str) -> Result<(), OutputError> {
    while let Some(rest) = next_specifier(out, format)? {
        out.write_bytes(b"%")?;
        format = rest;
    }
    Ok(())
}

/// A log record: a template plus the values captured at the call site.
///
/// Built by the [`log!`](crate::log) macro; the whole record is moved into
/// the calling thread's input ring and rendered later on the output thread.
pub struct TemplateRecord<Args> {
    format: &'static str,
    args: Args,
}

/// Bundle a template with its arguments.
pub fn template<Args>(format: &'static str, args: Args) -> TemplateRecord<Args> {
    TemplateRecord { format, args }
}

impl Render for TemplateRecord<()> {
    fn render(&self, out: &mut OutputBuffer) -> Result<(), OutputError> {
        finish_template(out, self.format)
    }
}

macro_rules! template_render_impls {
    ($( ($($arg:ident $idx:tt)+) )*) => {$(
        impl<$($arg: Format),+> Render for TemplateRecord<($($arg,)+)> {
            fn render(&self, out: &mut OutputBuffer) -> Result<(), OutputError> {
                let mut format = self.format;
                $(
                    match next_specifier(out, format)? {
                        // More arguments than specifiers: drop the rest.
                        None => return Ok(()),
                        Some(rest) => {
                            let mut spec = rest;
                            if !self.args.$idx.format(out, &mut spec)? {
                                // Unhandled specifier: reproduce the `%` and
                                // let the specifier text flow through as
                                // literal output.
                                out.write_bytes(b"%")?;
                            }
                            format = spec;
                        }
                    }
                )+
                finish_template(out, format)
            }
        }
    )*};
}

template_render_impls! {
    (A 0)
    (A 0 B 1)
    (A 0 B 1 C 2)
    (A 0 B 1 C 2 D 3)
    (A 0 B 1 C 2 D 3 E 4)
    (A 0 B 1 C 2 D 3 E 4 F 5)
    (A 0 B 1 C 2 D 3 E 4 F 5 G 6)
    (A 0 B 1 C 2 D 3 E 4 F 5 G 6 H 7)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MemoryWriter;

    fn render_to_string<R: Render>(record: R) -> String {
        let writer = MemoryWriter::new();
        let mut out = OutputBuffer::new(Box::new(writer.clone()), 4096);
        record.render(&mut out).unwrap();
        out.flush();
        String::from_utf8(writer.contents()).unwrap()
    }

    #[test]
    fn test_plain_template() {
        assert_eq!(
            render_to_string(template("no specifiers", ())),
            "no specifiers"
        );
    }

    #[test]
    fn test_percent_escape() {
        assert_eq!(render_to_string(template("100%% done", ())), "100% done");
    }

    #[test]
    fn test_integer_decimal() {
        assert_eq!(render_to_string(template("n=%d", (42,))), "n=42");
        assert_eq!(render_to_string(template("n=%d", (-7i64,))), "n=-7");
        assert_eq!(
            render_to_string(template("n=%d", (u64::MAX,))),
            format!("n={}", u64::MAX)
        );
    }

    #[test]
    fn test_float_six_fraction_digits() {
        assert_eq!(
            render_to_string(template("pi=%d", (3.25f64,))),
            "pi=3.250000"
        );
        assert_eq!(
            render_to_string(template("x=%d", (-0.5f32,))),
            "x=-0.500000"
        );
    }

    #[test]
    fn test_string_and_char() {
        assert_eq!(render_to_string(template("%s!", ("hey",))), "hey!");
        assert_eq!(
            render_to_string(template("%s%s", ('a', String::from("bc")))),
            "abc"
        );
    }

    #[test]
    fn test_char_falls_back_to_numeric() {
        assert_eq!(render_to_string(template("%d", ('A',))), "65");
    }

    #[test]
    fn test_multiple_arguments() {
        assert_eq!(
            render_to_string(template(
                "%s relayed %d packets in %d s\n",
                ("eth0", 1500u32, 2.5f64)
            )),
            "eth0 relayed 1500 packets in 2.500000 s\n"
        );
    }

    #[test]
    fn test_unhandled_specifier_passes_through() {
        // `x` is recognized by nothing; the specifier survives as literal
        // text and the argument is dropped.
        assert_eq!(render_to_string(template("n=%x", (42,))), "n=%x");
    }

    #[test]
    fn test_missing_arguments_leave_specifier() {
        assert_eq!(render_to_string(template("a=%d b=%d", (1,))), "a=1 b=%d");
    }

    #[test]
    fn test_extra_arguments_are_dropped() {
        assert_eq!(render_to_string(template("a=%d", (1, 2))), "a=1");
    }

    #[test]
    fn test_unhandled_specifier_reports_false_and_keeps_spec() {
        let writer = MemoryWriter::new();
        let mut out = OutputBuffer::new(Box::new(writer), 64);
        let mut spec = "x rest";
        assert!(!5i32.format(&mut out, &mut spec).unwrap());
        assert_eq!(spec, "x rest");
    }
}
