use crate::error::TplError;
use crate::template::TemplateSet;
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde_json::{Map, Value};
use std::fmt;
use std::io::{BufReader, Read, Write};

/// Render `template` once per element of the JSON array read from `input`.
///
/// Elements are decoded and rendered one at a time, in order, and each
/// render is flushed before the next element is read. Returns the number of
/// renders written.
pub fn render_stream<R, W>(
    set: &TemplateSet,
    template: &str,
    input: R,
    out: &mut W,
) -> Result<usize, TplError>
where
    R: Read,
    W: Write,
{
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(input));
    let mut sink = RecordSink {
        set,
        template,
        out,
        opened: false,
        rendered: 0,
        failure: None,
    };

    let result = deserializer.deserialize_seq(&mut sink);
    if let Some(failure) = sink.failure.take() {
        return Err(failure);
    }
    match result {
        Ok(()) => Ok(sink.rendered),
        Err(e) if !sink.opened => Err(TplError::StreamFormat(e.to_string())),
        Err(e) => Err(TplError::InvalidJson {
            origin: format!("stream record {}", sink.rendered),
            source: e,
        }),
    }
}

/// Receives the top-level array element by element
struct RecordSink<'a, W: Write> {
    set: &'a TemplateSet,
    template: &'a str,
    out: &'a mut W,
    /// Set once the leading `[` has been accepted
    opened: bool,
    rendered: usize,
    /// A render or write error, reported instead of the deserializer's error
    failure: Option<TplError>,
}

impl<'a, W: Write> RecordSink<'a, W> {
    fn render(&mut self, record: Map<String, Value>) -> Result<(), TplError> {
        self.set
            .execute(self.template, &Value::Object(record), self.out)?;
        self.out.flush()?;
        self.rendered += 1;
        tracing::debug!(template = self.template, record = self.rendered, "rendered record");
        Ok(())
    }
}

impl<'de, 'a, 'b, W: Write> Visitor<'de> for &'b mut RecordSink<'a, W> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON array of objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        self.opened = true;
        while let Some(record) = seq.next_element::<Map<String, Value>>()? {
            if let Err(e) = self.render(record) {
                self.failure = Some(e);
                return Err(de::Error::custom("stopped after render failure"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::FuncRegistry;

    fn hello_set() -> TemplateSet {
        TemplateSet::from_sources([("hello.tmpl", "Hello {{.Name}}!")], FuncRegistry::standard())
            .unwrap()
    }

    fn stream(input: &str) -> (Result<usize, TplError>, String) {
        let set = hello_set();
        let mut out = Vec::new();
        let result = render_stream(&set, "hello.tmpl", input.as_bytes(), &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_renders_each_record_without_separator() {
        let (result, out) = stream(r#"[{"Name":"Alice"},{"Name":"Bob"}]"#);
        assert_eq!(result.unwrap(), 2);
        assert_eq!(out, "Hello Alice!Hello Bob!");
    }

    #[test]
    fn test_whitespace_around_array() {
        let (result, out) = stream("\n  [ {\"Name\": \"A\"} ,\n {\"Name\": \"B\"} ]\n");
        assert_eq!(result.unwrap(), 2);
        assert_eq!(out, "Hello A!Hello B!");
    }

    #[test]
    fn test_empty_array_renders_nothing() {
        let (result, out) = stream("[]");
        assert_eq!(result.unwrap(), 0);
        assert_eq!(out, "");
    }

    #[test]
    fn test_top_level_object_is_rejected() {
        let (result, out) = stream(r#"{"Name":"Alice"}"#);
        assert!(matches!(result, Err(TplError::StreamFormat(_))));
        assert_eq!(out, "");
    }

    #[test]
    fn test_non_delimiter_token_is_rejected() {
        for input in ["\"text\"", "42", "null", ""] {
            let (result, out) = stream(input);
            assert!(
                matches!(result, Err(TplError::StreamFormat(_))),
                "input {:?} should be a stream format error",
                input
            );
            assert_eq!(out, "");
        }
    }

    #[test]
    fn test_bad_element_stops_after_earlier_output() {
        let (result, out) = stream(r#"[{"Name":"Alice"}, 7, {"Name":"Carol"}]"#);
        match result {
            Err(TplError::InvalidJson { origin, .. }) => assert_eq!(origin, "stream record 1"),
            other => panic!("Expected InvalidJson error, got {:?}", other),
        }
        assert_eq!(out, "Hello Alice!");
    }

    #[test]
    fn test_truncated_input_is_invalid_json() {
        let (result, out) = stream(r#"[{"Name":"Alice"}, {"Name":"#);
        assert!(matches!(result, Err(TplError::InvalidJson { .. })));
        assert_eq!(out, "Hello Alice!");
    }

    #[test]
    fn test_render_failure_stops_processing() {
        let (result, out) = stream(r#"[{"Name":"Alice"}, {"Other":"x"}, {"Name":"Carol"}]"#);
        match result {
            Err(TplError::Render { template, message }) => {
                assert_eq!(template, "hello.tmpl");
                assert!(message.contains("map has no entry for key \"Name\""));
            }
            other => panic!("Expected Render error, got {:?}", other),
        }
        assert_eq!(out, "Hello Alice!Hello ");
    }

    #[test]
    fn test_trailing_input_after_array_is_not_read() {
        let (result, out) = stream(r#"[{"Name":"A"}] trailing"#);
        assert_eq!(result.unwrap(), 1);
        assert_eq!(out, "Hello A!");
    }
}
