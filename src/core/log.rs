/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Log line layout shared by the console and file layers.

use chrono::Local;
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields, FormattedFields, format};
use tracing_subscriber::registry::LookupSpan;

/// `<local time> <level> [thread] <target>:<line>[:span{fields}]*: <event fields>`
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsLogFormatter {
    /// Prefix each line with the emitting thread name
    pub thread_names: bool,
}

impl DnsLogFormatter {
    pub fn with_thread_names(thread_names: bool) -> Self {
        Self { thread_names }
    }
}

impl<S, N> FormatEvent<S, N> for DnsLogFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "{} {:>5}",
            Local::now().format("%FT%T%.3f"),
            metadata.level()
        )?;

        if self.thread_names {
            let thread = std::thread::current();
            write!(writer, " [{}]", thread.name().unwrap_or("-"))?;
        }

        write!(writer, " {}", metadata.target())?;
        if let Some(line) = metadata.line() {
            write!(writer, ":{line}")?;
        }

        // Enclosing spans, outermost first
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, ":{}", span.name())?;
                let ext = span.extensions();
                match ext.get::<FormattedFields<N>>() {
                    Some(fields) if !fields.is_empty() => write!(writer, "{{{fields}}}")?,
                    _ => {}
                }
            }
        }

        write!(writer, ": ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
