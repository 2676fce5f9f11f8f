use docflow_core::{authorize_document_patch, DocumentPatch, PatchActor};
use docflow_record::{DocumentId, DocumentRecord, DocumentStatus, Product};
use proptest::prelude::*;

const OWNER: &str = "owner@x.com";

fn record(approvers: &[String]) -> DocumentRecord {
    let mut record = DocumentRecord::draft(
        DocumentId::parse("p1").unwrap(),
        "Plan",
        "RFC",
        &Product::new("Terraform", "TF"),
        OWNER,
    );
    record.status = DocumentStatus::InReview;
    record.approvers = approvers.to_vec();
    record
}

fn approvers(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("a{i}@x.com")).collect()
}

fn approvers_only(list: Vec<String>) -> DocumentPatch {
    DocumentPatch {
        approvers: Some(list),
        ..DocumentPatch::default()
    }
}

#[test]
fn test_owner_is_never_restricted() {
    let record = record(&approvers(2));
    let patch = DocumentPatch {
        title: Some("t".into()),
        owners: Some(vec!["next@x.com".into()]),
        status: Some("Obsolete".into()),
        ..DocumentPatch::default()
    };
    assert_eq!(
        authorize_document_patch(OWNER, &record, &patch).unwrap(),
        PatchActor::Owner
    );
}

proptest! {
    #[test]
    fn prop_self_removal_in_any_order_is_allowed(
        count in 1usize..6,
        pick in any::<prop::sample::Index>(),
        shuffle_seed in any::<u64>(),
    ) {
        let current = approvers(count);
        let me = current[pick.index(count)].clone();
        let mut rest: Vec<String> = current.iter().filter(|a| **a != me).cloned().collect();
        if !rest.is_empty() {
            let k = usize::try_from(shuffle_seed % rest.len() as u64).unwrap();
            rest.rotate_left(k);
        }

        let actor = authorize_document_patch(&me, &record(&current), &approvers_only(rest));
        prop_assert_eq!(actor.unwrap(), PatchActor::SelfRemovingApprover);
    }

    #[test]
    fn prop_any_other_approver_list_is_forbidden(
        count in 1usize..6,
        pick in any::<prop::sample::Index>(),
        keep in prop::collection::vec(any::<bool>(), 6),
        stranger in any::<bool>(),
    ) {
        let current = approvers(count);
        let me = current[pick.index(count)].clone();
        let mut requested: Vec<String> = current
            .iter()
            .zip(&keep)
            .filter(|(_, keep)| **keep)
            .map(|(a, _)| a.clone())
            .collect();
        if stranger {
            requested.push("stranger@x.com".into());
        }
        let exactly_self = !stranger
            && requested.len() + 1 == current.len()
            && !requested.contains(&me);
        prop_assume!(!exactly_self);

        let result = authorize_document_patch(&me, &record(&current), &approvers_only(requested));
        prop_assert!(result.is_err());
    }

    #[test]
    fn prop_outsiders_are_always_forbidden(
        count in 0usize..6,
        requested in prop::collection::vec("[a-z]{1,4}@x\\.com", 0..6),
    ) {
        let result = authorize_document_patch(
            "outsider@y.com",
            &record(&approvers(count)),
            &approvers_only(requested),
        );
        prop_assert!(result.is_err());
    }
}
