use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {pos} 条 ({per_sec}) {msg}")
        .expect("invalid progress bar template")
}
