//! WAL test suite: entry codec, writer, reader
