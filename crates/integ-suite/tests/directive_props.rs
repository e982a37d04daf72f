use integ_suite::{LegacyDirective, LegacySuite, SuiteError, TestSuite};
use proptest::prelude::*;

fn stack_name() -> impl Strategy<Value = String> {
    "[A-Z][A-Za-z0-9]{0,12}"
}

proptest! {
    #[test]
    fn prop_directive_words_split_into_stacks_and_context(
        stacks in proptest::collection::vec(stack_name(), 0..4),
        context in proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{1,8}", 0..4),
    ) {
        let mut line = String::from("// !cdk-integ");
        for s in &stacks {
            line.push(' ');
            line.push_str(s);
        }
        for (k, v) in &context {
            line.push_str(&format!(" pragma:set-context:{k}={v}"));
        }
        let directive = LegacyDirective::parse(&format!("import x\n{line}\n")).unwrap();
        prop_assert_eq!(directive.stacks, stacks);
        prop_assert_eq!(directive.context, context);
    }

    #[test]
    fn prop_explicit_selection_is_preserved(
        discovered in proptest::collection::btree_set(stack_name(), 1..6),
        pick in any::<prop::sample::Index>(),
    ) {
        let discovered: Vec<String> = discovered.into_iter().collect();
        let chosen = discovered[pick.index(discovered.len())].clone();
        let source = format!("// !cdk-integ {chosen}");
        let suite = TestSuite::Legacy(LegacySuite::infer("t", &source, &discovered).unwrap());
        prop_assert_eq!(suite.stacks().into_iter().collect::<Vec<_>>(), vec![chosen]);
    }

    #[test]
    fn prop_implicit_selection_requires_single_stack(
        discovered in proptest::collection::btree_set(stack_name(), 0..5),
    ) {
        let discovered: Vec<String> = discovered.into_iter().collect();
        let result = LegacySuite::infer("t", "", &discovered);
        match discovered.len() {
            0 => { let is_no_stacks = matches!(result, Err(SuiteError::NoStacks { .. })); prop_assert!(is_no_stacks) }
            1 => prop_assert!(result.is_ok()),
            _ => { let is_ambiguous = matches!(result, Err(SuiteError::AmbiguousStacks { .. })); prop_assert!(is_ambiguous) }
        }
    }
}
