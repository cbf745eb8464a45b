use super::common::*;
use crate::workflows::accounts::{Principal, Role, UserId};
use crate::workflows::applications::{
    Access, AccessDenied, AccessGuard, DocumentKind, Operation,
};

fn principal(role: Role, verified: bool) -> Principal {
    Principal {
        user_id: UserId::new(),
        role,
        verified,
    }
}

#[test]
fn citizens_act_as_owners() {
    let guard = AccessGuard;
    let citizen = principal(Role::Citizen, true);

    for operation in [Operation::Submit, Operation::View, Operation::Download] {
        assert_eq!(guard.authorize(&citizen, operation), Ok(Access::Owner));
    }
    for operation in [Operation::Transition, Operation::ReviewQueue] {
        assert_eq!(
            guard.authorize(&citizen, operation),
            Err(AccessDenied::WrongRole {
                required: Role::Agency,
                operation,
            })
        );
    }
}

#[test]
fn agencies_act_as_reviewers() {
    let guard = AccessGuard;
    let agency = principal(Role::Agency, true);

    for operation in [
        Operation::View,
        Operation::Download,
        Operation::Transition,
        Operation::ReviewQueue,
    ] {
        assert_eq!(guard.authorize(&agency, operation), Ok(Access::Reviewer));
    }
    assert_eq!(
        guard.authorize(&agency, Operation::Submit),
        Err(AccessDenied::WrongRole {
            required: Role::Citizen,
            operation: Operation::Submit,
        })
    );
}

#[test]
fn unverified_accounts_are_refused_everything() {
    let guard = AccessGuard;
    for role in [Role::Citizen, Role::Agency] {
        let pending = principal(role, false);
        for operation in [
            Operation::Submit,
            Operation::View,
            Operation::Download,
            Operation::Transition,
            Operation::ReviewQueue,
        ] {
            assert_eq!(
                guard.authorize(&pending, operation),
                Err(AccessDenied::Unverified)
            );
        }
    }
}

#[test]
fn ownership_is_checked_against_the_application() {
    let (service, store, _, _) = build_service();
    let asha = citizen(&store, "AshaVerma1");
    let application = service
        .submit(&asha, DocumentKind::Passport, passport_form(), passport_files())
        .expect("submission succeeds")
        .application;

    let guard = AccessGuard;
    let stranger = principal(Role::Citizen, true);
    let reviewer = principal(Role::Agency, true);

    assert_eq!(
        guard.authorize_on(&asha, Operation::Download, &application),
        Ok(Access::Owner)
    );
    assert_eq!(
        guard.authorize_on(&stranger, Operation::View, &application),
        Err(AccessDenied::NotOwner)
    );
    assert_eq!(
        guard.authorize_on(&reviewer, Operation::Download, &application),
        Ok(Access::Reviewer)
    );
}

#[test]
fn denial_messages_name_the_operation() {
    let denied = AccessDenied::WrongRole {
        required: Role::Agency,
        operation: Operation::Transition,
    };
    assert_eq!(
        denied.to_string(),
        format!("only agency accounts may {}", Operation::Transition.label())
    );
}
