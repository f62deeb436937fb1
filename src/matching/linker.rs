use tracing::debug;

use super::normalizer::normalize;
use super::similarity::score;
use super::types::{EndpointRecord, LinkResult, OrganizationRecord};
use super::TARGET_LINKER;

/// Default minimum score for a name match.
pub const DEFAULT_LINK_THRESHOLD: f64 = 0.75;

/// Match an endpoint's organization name against every candidate organization.
///
/// A candidate matches when its primary or secondary name scores exactly 1.0,
/// or when either score reaches `threshold`. The confidence is the higher of
/// the two scores. Several candidates may match the same name; an empty result
/// means the name is unmatchable.
pub fn link_organizations(
    endpoint_name: &str,
    candidates: &[OrganizationRecord],
    threshold: f64,
) -> Vec<LinkResult> {
    let normalized_endpoint = normalize(endpoint_name);
    let mut links = Vec::new();

    for candidate in candidates {
        let primary_score = score(&normalized_endpoint, &normalize(&candidate.primary_name));
        let secondary_score = candidate
            .secondary_name
            .as_deref()
            .map(|name| score(&normalized_endpoint, &normalize(name)))
            .unwrap_or(0.0);

        let best = primary_score.max(secondary_score);
        let pinned = primary_score == 1.0 || secondary_score == 1.0;

        if pinned || best >= threshold {
            debug!(
                target: TARGET_LINKER,
                "'{}' => {} (primary {:.3}, secondary {:.3}{})",
                normalized_endpoint,
                candidate.npi_id,
                primary_score,
                secondary_score,
                if pinned { ", exact" } else { "" }
            );
            links.push(LinkResult {
                organization_id: candidate.npi_id.clone(),
                confidence: best,
            });
        }
    }

    links
}

/// Fold `incoming` into `all`, keeping the highest confidence per organization.
pub fn merge_matches(all: &mut Vec<LinkResult>, incoming: Vec<LinkResult>) {
    for link in incoming {
        match all
            .iter_mut()
            .find(|existing| existing.organization_id == link.organization_id)
        {
            Some(existing) => {
                if link.confidence > existing.confidence {
                    existing.confidence = link.confidence;
                }
            }
            None => all.push(link),
        }
    }
}

/// Name matches across every organization name an endpoint publishes.
pub fn match_by_name(
    endpoint: &EndpointRecord,
    candidates: &[OrganizationRecord],
    threshold: f64,
) -> Vec<LinkResult> {
    let mut all = Vec::new();
    for name in endpoint.names() {
        merge_matches(&mut all, link_organizations(name, candidates, threshold));
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::types::confidence_by_id;

    fn orgs() -> Vec<OrganizationRecord> {
        vec![
            OrganizationRecord::new("1001", "Mercy Health System"),
            OrganizationRecord::new("1002", "Saint Luke Hospital")
                .with_secondary_name("St Luke Medical Group"),
            OrganizationRecord::new("1003", "Valley Family Practice"),
        ]
    }

    #[test]
    fn test_exact_primary_match_is_pinned() {
        // threshold above 1.0 still admits an exact match
        let links = link_organizations("mercy-health system!", &orgs(), 1.5);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].organization_id, "1001");
        assert_eq!(links[0].confidence, 1.0);
    }

    #[test]
    fn test_exact_secondary_match_is_pinned() {
        let links = link_organizations("St. Luke Medical Group", &orgs(), 1.5);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].organization_id, "1002");
        assert_eq!(links[0].confidence, 1.0);
    }

    #[test]
    fn test_scores_below_threshold_are_excluded() {
        // 2/4 against the primary name, 0 against everything else
        let links = link_organizations("Mercy Clinic System", &orgs(), DEFAULT_LINK_THRESHOLD);
        assert!(links.is_empty());
    }

    #[test]
    fn test_threshold_match_keeps_highest_score() {
        // primary: SAINT LUKE HOSPITAL vs ST LUKE MEDICAL GROUP INC => 1/7
        // secondary: 4/5
        let links = link_organizations(
            "St Luke Medical Group Inc",
            &orgs(),
            DEFAULT_LINK_THRESHOLD,
        );
        assert_eq!(links.len(), 1);
        assert!((links[0].confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_primary_confidence_not_overwritten_by_secondary() {
        let candidates = vec![OrganizationRecord::new("2001", "Lakeside Regional Medical Center")
            .with_secondary_name("Lakeside Center")];
        // primary 4/5, secondary 2/5
        let links = link_organizations("Lakeside Regional Medical Center East", &candidates, 0.75);
        assert_eq!(links.len(), 1);
        assert!((links[0].confidence - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_one_name_may_link_to_several_organizations() {
        let candidates = vec![
            OrganizationRecord::new("3001", "Community Hospital"),
            OrganizationRecord::new("3002", "Community Hospital"),
        ];
        let links = link_organizations("COMMUNITY HOSPITAL", &candidates, 0.75);
        let confidences = confidence_by_id(&links);
        assert_eq!(confidences.len(), 2);
        assert_eq!(confidences["3001"], 1.0);
        assert_eq!(confidences["3002"], 1.0);
    }

    #[test]
    fn test_merge_keeps_max_confidence() {
        let mut all = vec![LinkResult {
            organization_id: "1".to_string(),
            confidence: 0.8,
        }];
        merge_matches(
            &mut all,
            vec![
                LinkResult {
                    organization_id: "1".to_string(),
                    confidence: 0.9,
                },
                LinkResult {
                    organization_id: "2".to_string(),
                    confidence: 0.76,
                },
            ],
        );
        merge_matches(
            &mut all,
            vec![LinkResult {
                organization_id: "1".to_string(),
                confidence: 0.5,
            }],
        );
        let confidences = confidence_by_id(&all);
        assert_eq!(all.len(), 2);
        assert_eq!(confidences["1"], 0.9);
        assert_eq!(confidences["2"], 0.76);
    }

    #[test]
    fn test_match_by_name_uses_alternate_names() {
        let endpoint = EndpointRecord::new("https://fhir.example.org/r4", "Unknown Org")
            .with_alternate_name("Valley Family Practice");
        let links = match_by_name(&endpoint, &orgs(), DEFAULT_LINK_THRESHOLD);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].organization_id, "1003");
    }
}
