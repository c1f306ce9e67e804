// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use rstest::rstest;

use crate::il::{Dest, Expr, Insn, VarId};

const BLOCK: VarId = VarId(1);

#[rstest]
#[case(Expr::Var(BLOCK), Some(0))]
#[case(Expr::field(Expr::Var(BLOCK), 0x10), Some(0x10))]
#[case(Expr::field(Expr::field(Expr::Var(BLOCK), 0x20), 0x8), Some(0x28))]
#[case(Expr::field(Expr::Var(VarId(2)), 0x10), None)]
#[case(Expr::Deref(Box::new(Expr::Var(BLOCK))), None)]
fn test_field_offset(#[case] dest: Expr, #[case] offset: Option<u64>) {
    assert_eq!(Dest::Expr(&dest).field_offset(BLOCK), offset);
}

#[test]
fn test_mentions() {
    let deref = Expr::DerefField {
        base: Box::new(Expr::Var(BLOCK)),
        offset: 8,
    };
    assert!(deref.mentions(BLOCK));
    assert!(Dest::Expr(&deref).field_offset(BLOCK).is_none());
    let call = Expr::Call {
        target: Box::new(Expr::import(0x100, "_objc_retain")),
        args: vec![Expr::address_of(Expr::Var(BLOCK))],
    };
    assert!(call.mentions(BLOCK));
    assert!(!call.mentions(VarId(7)));
}

#[test]
fn test_store() {
    let init = Insn::init(0x10, 1, Expr::import(0x8000, "__NSConcreteStackBlock"));
    let (dest, src) = init.store().unwrap();
    assert_eq!(dest, Dest::Var(BLOCK));
    assert_eq!(src.to_string(), "__NSConcreteStackBlock");
    assert_eq!(init.declared_var(), Some(BLOCK));

    let decl = Insn::declare(0x8, 2);
    assert!(decl.store().is_none());
    assert_eq!(decl.declared_var(), Some(VarId(2)));
}

#[test]
fn test_display() {
    let expr = Expr::Call {
        target: Box::new(Expr::import(0x100, "_dispatch_async")),
        args: vec![Expr::Const(0x10), Expr::address_of(Expr::field(Expr::Var(BLOCK), 0x8))],
    };
    assert_eq!(expr.to_string(), "_dispatch_async(0x10, &var_1.field_8)");
}
