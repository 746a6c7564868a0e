//! Model-name canonicalization.
//!
//! Providers print the same physical chip in many shapes ("H100 SXM5",
//! "NVIDIA H100-SXM", "A4000" without the RTX prefix). Normalization runs at
//! ingestion time, before deduplication and persistence, so one chip never
//! splits across multiple facet entries.

/// Normalizes a GPU model display name.
///
/// - Strips redundant SXM version digits: the version is deterministic per
///   chip (H100/H200 are always SXM5, A100 is SXM4, B200/B300 are SXM6), so
///   `SXM4`/`SXM5`/`SXM6` all collapse to `SXM`.
/// - Restores the RTX prefix some providers omit on professional Ampere
///   cards: "NVIDIA A4000" becomes "NVIDIA RTX A4000".
/// - Drops the redundant generation word in "RTX PRO 6000 Blackwell SE".
/// - Collapses runs of whitespace.
#[must_use]
pub fn normalize_gpu_model(name: &str) -> String {
    let mut tokens: Vec<&str> = name.split_whitespace().collect();

    for token in &mut tokens {
        if matches!(*token, "SXM4" | "SXM5" | "SXM6") {
            *token = "SXM";
        }
    }

    let mut out: Vec<&str> = Vec::with_capacity(tokens.len() + 1);
    let mut i = 0;
    while i < tokens.len() {
        out.push(tokens[i]);
        let next_is_pro_ampere =
            tokens.get(i + 1).is_some_and(|t| matches!(*t, "A4000" | "A5000" | "A6000"));
        if tokens[i] == "NVIDIA" && next_is_pro_ampere {
            out.push("RTX");
        }
        i += 1;
    }

    out.join(" ").replace("RTX PRO 6000 Blackwell SE", "RTX PRO 6000 SE")
}

/// Lowercased, trimmed canonical model, the form used in configuration
/// keys and stable identity keys.
#[must_use]
pub fn canonical_model(name: &str) -> String {
    normalize_gpu_model(name).to_lowercase().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_sxm_version_digits() {
        assert_eq!(normalize_gpu_model("NVIDIA H100 SXM5"), "NVIDIA H100 SXM");
        assert_eq!(normalize_gpu_model("NVIDIA A100 SXM4"), "NVIDIA A100 SXM");
        assert_eq!(normalize_gpu_model("NVIDIA B200 SXM6"), "NVIDIA B200 SXM");
    }

    #[test]
    fn restores_rtx_prefix_on_professional_ampere() {
        assert_eq!(normalize_gpu_model("NVIDIA A4000"), "NVIDIA RTX A4000");
        assert_eq!(normalize_gpu_model("NVIDIA A6000"), "NVIDIA RTX A6000");
        // Already prefixed names stay unchanged.
        assert_eq!(normalize_gpu_model("NVIDIA RTX A4000"), "NVIDIA RTX A4000");
    }

    #[test]
    fn leaves_datacenter_ampere_alone() {
        assert_eq!(normalize_gpu_model("NVIDIA A100"), "NVIDIA A100");
        assert_eq!(normalize_gpu_model("NVIDIA A40"), "NVIDIA A40");
    }

    #[test]
    fn drops_blackwell_generation_word() {
        assert_eq!(
            normalize_gpu_model("NVIDIA RTX PRO 6000 Blackwell SE"),
            "NVIDIA RTX PRO 6000 SE"
        );
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(normalize_gpu_model("  NVIDIA   H200  "), "NVIDIA H200");
    }

    #[test]
    fn canonical_model_lowercases() {
        assert_eq!(canonical_model("NVIDIA H100 SXM5"), "nvidia h100 sxm");
    }
}
