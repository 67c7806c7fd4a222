//! Colored terminal output for CLI commands

use std::path::Path;

use colored::*;

use crate::features::FeatureRecord;
use crate::ranker::RankedMatch;
use crate::similarity::{PeakSimilarity, SimilarityVerdict};

/// Print one image's feature record.
pub fn show_features(path: &Path, record: &FeatureRecord) {
  println!("{} {}", "Chromatograph".blue().bold(), path.display());
  println!(
    "  {} peaks ({:?} detection, system: {:?})",
    record.peak_count().to_string().yellow(),
    record.detection_mode,
    record.system_type,
  );
  for (peak, position) in record.peaks.iter().zip(record.normalized_positions.iter()) {
    println!(
      "  peak @ {:>4} (t={:.2}): height {:.3}, width {:.1}",
      peak.position, position, peak.height, peak.width
    );
  }
  println!(
    "  intensity: mean {:.3}, std {:.3}, total {:.1}",
    record.mean_intensity, record.std_intensity, record.total_intensity
  );
  if let Some(a2) = record.a2_concentration {
    println!("  printed A2: {}", format!("{a2:.1}%").cyan());
  }
  if let Some(f) = record.f_concentration {
    println!("  printed F: {}", format!("{f:.1}%").cyan());
  }
}

/// Print a hard-filter verdict.
pub fn show_verdict(verdict: &SimilarityVerdict) {
  if verdict.is_similar {
    println!("{} {}", "✓".green(), verdict.reason);
  } else {
    println!("{} {}", "✗".red(), verdict.reason);
  }
}

/// Print a weighted similarity with its factor breakdown.
pub fn show_similarity(similarity: &PeakSimilarity) {
  println!("  score: {}", format!("{:.3}", similarity.score).green().bold());
  println!("    num_peaks:      {:.3}", similarity.factors.num_peaks);
  println!("    heights:        {:.3}", similarity.factors.heights);
  println!("    retention_time: {:.3}", similarity.factors.retention_time);
  println!("    intensity:      {:.3}", similarity.factors.intensity);
}

/// Print the final ranking.
pub fn show_matches(query: &FeatureRecord, matches: &[RankedMatch]) {
  println!(
    "{} query has {} peaks at {:?}",
    "Query".blue().bold(),
    query.peak_count(),
    query.normalized_positions.iter().map(|p| (p * 100.0).round() / 100.0).collect::<Vec<_>>(),
  );

  if matches.is_empty() {
    println!("No clinically comparable matches found.");
    return;
  }

  for (rank, matched) in matches.iter().enumerate() {
    let clinical = match matched.clinical_similarity {
      Some(score) => format!("{score:.3}"),
      None => "n/a".to_string(),
    };
    println!(
      "{} {} ({}) combined {} | embedding {:.3} | clinical {} | peaks {}",
      format!("#{}", rank + 1).yellow().bold(),
      matched.candidate.id.cyan(),
      matched.candidate.category,
      format!("{:.3}", matched.combined_score).green().bold(),
      matched.embedding_similarity,
      clinical,
      matched.peak_count.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
    );
  }
}
