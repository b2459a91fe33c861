//! Cross-module scenarios: the full text and QR pipelines drawn into real frames.
