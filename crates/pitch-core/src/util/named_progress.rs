use indicatif::ProgressStyle;

/// Progress bar style with a fixed-width label, so stacked bars line up.
pub trait NamedProgress {
    /// Bar style labelled `name`.
    fn named_bar(name: &str) -> Self;
}

impl NamedProgress for ProgressStyle {
    fn named_bar(name: &str) -> Self {
        let template = format!(
            "{name:<24} {{wide_bar:40.green/white}} {{pos:>5}}/{{len:<5}} [{{elapsed_precise}}, eta {{eta}}] {{msg}}"
        );
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}
