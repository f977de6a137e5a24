// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property test for the `ns://` codec's round-trip law:
//! `parse(emit(source, opts)) == (source, opts)` for every valid input.

use ph_ns_url::{build_ns_url, parse_ns_url, NsAction, NsUrlOpts, RepoArgSpec};
use proptest::collection::btree_map;
use proptest::prelude::*;
use std::collections::BTreeMap;

fn arb_source() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9/_.-]{1,40}"
}

fn arb_repo_arg() -> impl Strategy<Value = RepoArgSpec> {
    prop_oneof![
        "[a-z0-9-]{1,20}".prop_map(RepoArgSpec::Bare),
        ("[a-z0-9-]{1,20}", proptest::option::of("[a-z0-9.-]{1,10}")).prop_map(
            |(repo, git_ref)| RepoArgSpec::Detailed { repo, git_ref }
        ),
    ]
}

fn arb_opts() -> impl Strategy<Value = NsUrlOpts> {
    (
        prop_oneof![Just(NsAction::Navigate), Just(NsAction::Child)],
        proptest::option::of("[a-zA-Z0-9.-]{1,20}"),
        proptest::option::of("[a-zA-Z0-9.-]{1,20}"),
        proptest::option::of(btree_map("[a-z]{1,10}", arb_repo_arg(), 1..3)),
        proptest::option::of(btree_map(
            "[A-Z_]{1,10}",
            "[a-zA-Z0-9]{0,10}",
            1..3,
        )),
        proptest::option::of("[a-zA-Z0-9 ]{1,20}"),
    )
        .prop_map(
            |(action, git_ref, template_spec, repo_args, env, name)| NsUrlOpts {
                action,
                git_ref,
                template_spec,
                repo_args: repo_args.map(|m: BTreeMap<String, RepoArgSpec>| m),
                env,
                state_args: None,
                name,
                focus: None,
                unsafe_arg: None,
            },
        )
}

proptest! {
    #[test]
    fn round_trips(source in arb_source(), opts in arb_opts()) {
        let url = build_ns_url(&source, &opts);
        let parsed = parse_ns_url(&url).expect("emitted url must parse");
        prop_assert_eq!(parsed.source, source);
        prop_assert_eq!(parsed.opts, opts);
    }
}
