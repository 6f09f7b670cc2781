use super::*;
use crate::dsl::*;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use tern_ast::{BinaryOp, Builtin, FunctionRef, PrefixOp, Stmt, SuffixOp, Type};
use tern_ir::{BinaryOp as IrOp, CompareOp, Instruction, Value};
use tern_liveness::Register;

fn main_fn(body: Vec<Stmt>) -> Program {
    program(vec![function("main", vec![], Type::Int, body)])
}

fn slots(func: &Function) -> Vec<u32> {
    func.blocks[0]
        .instructions
        .iter()
        .filter_map(|i| match i {
            Instruction::Alloca { dest, .. } => Some(*dest),
            _ => None,
        })
        .collect()
}

/// Position and instruction defining temporary `temp`
fn def_of(insts: &[Instruction], temp: &Value) -> (usize, Instruction) {
    let id = temp.as_temp().unwrap_or_else(|| panic!("{} is not a temporary", temp));
    insts
        .iter()
        .enumerate()
        .find(|(_, i)| i.dest() == Some(id))
        .map(|(at, i)| (at, i.clone()))
        .unwrap_or_else(|| panic!("no definition of {}", temp))
}

/// Value stored into `slot`, taken from the last store to it
fn stored_into(insts: &[Instruction], slot: u32) -> Value {
    insts
        .iter()
        .rev()
        .find_map(|i| match i {
            Instruction::Store { value, ptr, .. } if *ptr == Value::Temp(slot) => {
                Some(value.clone())
            }
            _ => None,
        })
        .unwrap_or_else(|| panic!("nothing stored into %t{}", slot))
}

fn regs(list: &[Register]) -> BTreeSet<Register> {
    list.iter().copied().collect()
}

// =========================================
// Block shapes
// =========================================

#[test]
fn test_scenario_straight_line_function() {
    // int f(int a) { int b = a + 1; return b; }
    let a = param(0, "a", Type::Int);
    let b = local(1, "b", Type::Int);
    let f = function(
        "f",
        vec![a.clone()],
        Type::Int,
        vec![
            declare(&b, Some(binary(BinaryOp::Add, ident(&a), int(1)))),
            ret(Some(ident(&b))),
        ],
    );
    let result = compile_entry(&program(vec![f]), "f");
    assert!(result.success, "{:?}", result.error);

    let module = result.module.unwrap();
    let func = lowered(&module, "__toplevel__.f");
    assert_eq!(labels(func), vec!["entry"]);
    assert_all_terminated(func);
    assert!(func.to_string().contains("%t3 = add i32 %t2, 1"));
}

#[test]
fn test_if_shapes() {
    let c = local(0, "c", Type::Bool);
    let with_else = main_fn(vec![
        declare(&c, Some(boolean(true))),
        if_stmt(ident(&c), ret(Some(int(1))), Some(ret(Some(int(2))))),
        ret(Some(int(3))),
    ]);
    let module = assert_compiles(&with_else);
    let func = lowered(&module, "main");
    // `end.0` is unreachable: both arms return
    assert_eq!(labels(func), vec!["entry", "then.0", "else.0"]);
    assert_all_terminated(func);
    assert_reachable(func);

    let without_else = main_fn(vec![
        declare(&c, Some(boolean(true))),
        if_stmt(ident(&c), expr(call(
            FunctionRef::Builtin(Builtin::PrintlnInt),
            vec![int(1)],
            Type::Void,
        )), None),
    ]);
    let module = assert_compiles(&without_else);
    let func = lowered(&module, "main");
    assert_eq!(labels(func), vec!["entry", "then.0", "end.0"]);
    assert_eq!(func.blocks[0].successors(), vec!["then.0", "end.0"]);
    assert_eq!(func.blocks[1].successors(), vec!["end.0"]);
    assert_all_terminated(func);
    assert_reachable(func);
}

#[test]
fn test_while_shape() {
    let x = local(0, "x", Type::Int);
    let c = local(1, "c", Type::Bool);
    let prog = main_fn(vec![
        declare(&x, Some(int(0))),
        declare(&c, Some(boolean(true))),
        while_loop(
            0,
            ident(&c),
            block(vec![expr(assign(
                ident(&x),
                binary(BinaryOp::Add, ident(&x), int(1)),
            ))]),
        ),
    ]);
    let module = assert_compiles(&prog);
    let func = lowered(&module, "main");

    assert_eq!(labels(func), vec!["entry", "condition.0", "body.0", "end.0"]);
    assert_eq!(func.blocks[0].successors(), vec!["condition.0"]);
    assert_eq!(func.blocks[1].successors(), vec!["body.0", "end.0"]);
    assert_eq!(func.blocks[2].successors(), vec!["condition.0"]);
    assert_all_terminated(func);
    assert_reachable(func);
}

#[test]
fn test_for_shape_runs_step_before_condition() {
    let i = local(0, "i", Type::Int);
    let prog = main_fn(vec![for_loop(
        0,
        Some(declare(&i, Some(int(0)))),
        Some(binary(BinaryOp::Less, ident(&i), int(10))),
        Some(suffix(SuffixOp::Inc, ident(&i))),
        block(vec![expr(call(
            FunctionRef::Builtin(Builtin::PrintlnInt),
            vec![ident(&i)],
            Type::Void,
        ))]),
    )]);
    let module = assert_compiles(&prog);
    let func = lowered(&module, "main");

    assert_eq!(
        labels(func),
        vec!["entry", "condition.0", "body.0", "step.0", "end.0"]
    );
    assert_eq!(func.get_block("body.0").unwrap().successors(), vec!["step.0"]);
    assert_eq!(
        func.get_block("step.0").unwrap().successors(),
        vec!["condition.0"]
    );
    assert_all_terminated(func);
    assert_reachable(func);
}

// =========================================
// Loop targets
// =========================================

#[test]
fn test_break_and_continue_follow_the_resolved_loop() {
    // while (c) { int i; while (c) { int i; if (c) break outer; else continue outer; } }
    let c = local(0, "c", Type::Bool);
    let outer_i = local(1, "i", Type::Int);
    let inner_i = local(2, "i", Type::Int);
    let inner = while_loop(
        3,
        ident(&c),
        block(vec![
            declare(&inner_i, Some(int(2))),
            if_stmt(ident(&c), break_to(7), Some(continue_to(7))),
        ]),
    );
    let prog = main_fn(vec![
        declare(&c, Some(boolean(true))),
        while_loop(
            7,
            ident(&c),
            block(vec![declare(&outer_i, Some(int(1))), inner]),
        ),
    ]);
    let module = assert_compiles(&prog);
    let func = lowered(&module, "main");

    // outer loop got label id 0, inner loop 1, the if 2
    assert_eq!(func.get_block("then.2").unwrap().successors(), vec!["end.0"]);
    assert_eq!(
        func.get_block("else.2").unwrap().successors(),
        vec!["condition.0"]
    );
    assert!(func.get_block("end.2").is_none());
    assert_eq!(
        func.get_block("end.1").unwrap().successors(),
        vec!["condition.0"]
    );
    assert_all_terminated(func);
    assert_reachable(func);
}

#[test]
fn test_continue_in_for_reruns_step() {
    let i = local(0, "i", Type::Int);
    let prog = main_fn(vec![for_loop(
        4,
        Some(declare(&i, Some(int(0)))),
        Some(binary(BinaryOp::Less, ident(&i), int(3))),
        Some(suffix(SuffixOp::Inc, ident(&i))),
        continue_to(4),
    )]);
    let module = assert_compiles(&prog);
    let func = lowered(&module, "main");
    assert_eq!(func.get_block("body.0").unwrap().successors(), vec!["step.0"]);
}

// =========================================
// Expressions
// =========================================

#[test]
fn test_constant_ternary_keeps_both_arms() {
    let prog = main_fn(vec![ret(Some(ternary(boolean(true), int(1), int(2))))]);
    let module = assert_compiles(&prog);
    let func = lowered(&module, "main");

    assert_eq!(labels(func), vec!["entry", "then.0", "else.0", "end.0"]);
    let phis: Vec<_> = func
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .filter(|i| matches!(i, Instruction::Phi { .. }))
        .collect();
    assert_eq!(phis.len(), 1);
    assert_all_terminated(func);
}

#[test]
fn test_short_circuit_skips_right_operand() {
    let a = local(0, "a", Type::Bool);
    let b = local(1, "b", Type::Bool);
    let prog = main_fn(vec![
        declare(&a, Some(boolean(false))),
        declare(&b, Some(binary(BinaryOp::LogicAnd, ident(&a), boolean(true)))),
    ]);
    let module = assert_compiles(&prog);
    let func = lowered(&module, "main");

    assert_eq!(labels(func), vec!["entry", "rhs.0", "merge.0"]);
    assert_eq!(func.blocks[0].successors(), vec!["rhs.0", "merge.0"]);
    assert!(func
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .all(|i| !matches!(i, Instruction::Phi { .. })));
}

#[test]
fn test_string_literals_are_pooled_once() {
    let print = |text: &str| {
        expr(call(
            FunctionRef::Builtin(Builtin::Println),
            vec![string(text)],
            Type::Void,
        ))
    };
    let prog = main_fn(vec![print("hi"), print("hi"), print("bye")]);
    let module = assert_compiles(&prog);

    assert_eq!(module.literal_count(), 2);
    assert_eq!(
        module
            .externals
            .iter()
            .map(|e| e.name)
            .collect::<Vec<_>>(),
        vec!["__println__"]
    );
}

#[test]
fn test_method_call_passes_receiver_last() {
    let x = field(10, "x", Type::Int, "Point");
    let get = method(
        "Point",
        "get",
        vec![],
        Type::Int,
        vec![ret(Some(member(this("Point"), &x)))],
    );
    let point = class("Point", vec![x.clone()], vec![get], None);
    let p = local(0, "p", Type::class("Point"));
    let main = function(
        "main",
        vec![],
        Type::Int,
        vec![
            declare(&p, Some(new_object(&point))),
            ret(Some(method_call(
                ident(&p),
                FunctionRef::member("Point", "get"),
                vec![],
                Type::Int,
            ))),
        ],
    );
    let prog = Program {
        classes: vec![point],
        functions: vec![main],
        ..Default::default()
    };
    let module = assert_compiles(&prog);

    let getter = lowered(&module, "Point.get");
    assert_eq!(getter.params.len(), 1);
    assert!(module.layout("Point").is_some());
    assert!(module.externals.iter().any(|e| e.name == "__malloc__"));

    let main = lowered(&module, "main");
    let call = main
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .find_map(|i| match i {
            Instruction::Call { function, args, .. } if function == "Point.get" => Some(args),
            _ => None,
        })
        .unwrap();
    assert_eq!(call.len(), 1);
}

#[test]
fn test_global_initializers_run_first() {
    let g = global(0, "g", Type::Int);
    let mut prog = main_fn(vec![ret(Some(ident(&g)))]);
    prog.globals.push(global_decl(&g, Some(int(5))));

    let module = assert_compiles(&prog);
    let init = lowered(&module, tern_ir::GLOBAL_INIT);
    assert_all_terminated(init);

    let main = lowered(&module, "main");
    let first_call = main.blocks[0].instructions.iter().find_map(|i| match i {
        Instruction::Call { function, .. } => Some(function.as_str()),
        _ => None,
    });
    assert_eq!(first_call, Some(tern_ir::GLOBAL_INIT));
    assert!(module.get_global("g").is_some());
}

#[test]
fn test_check_rejects_redeclaration_before_lowering() {
    let a = local(0, "a", Type::Int);
    let again = local(1, "a", Type::Int);
    let prog = main_fn(vec![declare(&a, None), declare(&again, None)]);

    let result = compile(&prog);
    assert!(!result.success);
    assert!(result.diagnostics.has_errors());
    assert!(result.module.is_none());
}

#[test]
fn test_shadowing_in_nested_block_is_allowed() {
    let a = local(0, "a", Type::Int);
    let inner = local(1, "a", Type::Int);
    let prog = main_fn(vec![
        declare(&a, Some(int(1))),
        block(vec![declare(&inner, Some(int(2))), ret(Some(ident(&inner)))]),
    ]);
    assert_compiles(&prog);
}

#[test]
fn test_dynamic_array_is_unsupported() {
    let arr = local(0, "arr", Type::array_of(Type::Int));
    let prog = main_fn(vec![declare(
        &arr,
        Some(tern_ast::Expr::new(
            tern_ast::ExprKind::NewArray {
                element: Type::Int,
                dimensions: vec![int(4)],
            },
            Type::array_of(Type::Int),
        )),
    )]);
    let result = compile(&prog);
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(!error.is_internal());
}

#[test]
fn test_program_loads_from_disk() {
    let a = param(0, "a", Type::Int);
    let f = function(
        "main",
        vec![a.clone()],
        Type::Int,
        vec![ret(Some(binary(BinaryOp::Mul, ident(&a), int(2))))],
    );
    let prog = program(vec![f]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("main.json");
    std::fs::write(&path, prog.to_json().unwrap()).unwrap();

    let loaded = Program::load(&path).unwrap();
    assert_eq!(
        assert_compiles(&loaded).to_string(),
        assert_compiles(&prog).to_string()
    );
}

#[test]
fn test_update_operators_and_indexing() {
    // int main(int[] a, bool b) {
    //     int x = 1; int y = ++x; int z = a[x]--; int w = -x; bool n = !b;
    // }
    let a = param(0, "a", Type::array_of(Type::Int));
    let b = param(1, "b", Type::Bool);
    let x = local(2, "x", Type::Int);
    let y = local(3, "y", Type::Int);
    let z = local(4, "z", Type::Int);
    let w = local(5, "w", Type::Int);
    let n = local(6, "n", Type::Bool);
    let f = function(
        "main",
        vec![a.clone(), b.clone()],
        Type::Int,
        vec![
            declare(&x, Some(int(1))),
            declare(&y, Some(prefix(PrefixOp::Inc, ident(&x)))),
            declare(&z, Some(suffix(SuffixOp::Dec, index(ident(&a), ident(&x))))),
            declare(&w, Some(prefix(PrefixOp::Neg, ident(&x)))),
            declare(&n, Some(prefix(PrefixOp::Not, ident(&b)))),
        ],
    );
    let module = assert_compiles(&program(vec![f]));
    let func = lowered(&module, "main");
    let insts = &func.blocks[0].instructions;
    let [a_slot, b_slot, x_slot, y_slot, z_slot, w_slot, n_slot] = slots(func)[..] else {
        panic!("unexpected slots in:\n{}", func);
    };
    let loads_from = |inst: &Instruction, slot: u32| {
        matches!(inst, Instruction::Load { ptr, .. } if *ptr == Value::Temp(slot))
    };

    // ++x: `y` gets x reloaded after the incremented value was stored back
    let (reload_at, reload) = def_of(insts, &stored_into(insts, y_slot));
    assert!(loads_from(&reload, x_slot), "{}", func);
    let add_at = insts
        .iter()
        .position(|i| matches!(i, Instruction::Binary { op: IrOp::Add, .. }))
        .unwrap();
    assert!(add_at < reload_at);
    assert!(matches!(
        &insts[add_at + 1],
        Instruction::Store { ptr, .. } if *ptr == Value::Temp(x_slot)
    ));

    // a[x]--: `z` gets the element as it was before the subtraction
    let before = stored_into(insts, z_slot);
    let (before_at, load) = def_of(insts, &before);
    let element = match load {
        Instruction::Load { ptr, .. } => ptr,
        other => panic!("expected a load, got {}", other),
    };
    assert_eq!(
        insts[before_at + 1],
        Instruction::Binary {
            dest: before.as_temp().unwrap() + 1,
            op: IrOp::Sub,
            ty: tern_ir::IrType::I32,
            lhs: before.clone(),
            rhs: Value::Const(1),
        }
    );
    match def_of(insts, &element).1 {
        Instruction::ElementAddr { base, index, .. } => {
            assert!(loads_from(&def_of(insts, &base).1, a_slot));
            assert!(loads_from(&def_of(insts, &index).1, x_slot));
        }
        other => panic!("expected an element address, got {}", other),
    }

    // -x is `sub 0, x`
    match def_of(insts, &stored_into(insts, w_slot)).1 {
        Instruction::Binary {
            op: IrOp::Sub,
            lhs: Value::Const(0),
            rhs,
            ..
        } => assert!(loads_from(&def_of(insts, &rhs).1, x_slot)),
        other => panic!("expected a negation, got {}", other),
    }

    // !b is `eq b, 0`
    match def_of(insts, &stored_into(insts, n_slot)).1 {
        Instruction::Compare {
            op: CompareOp::Eq,
            lhs,
            rhs: Value::Const(0),
            ..
        } => assert!(loads_from(&def_of(insts, &lhs).1, b_slot)),
        other => panic!("expected a logical not, got {}", other),
    }
}

// =========================================
// Liveness
// =========================================

#[test]
fn test_scenario_while_liveness() {
    let x = local(0, "x", Type::Int);
    let c = local(1, "c", Type::Bool);
    let prog = main_fn(vec![
        declare(&x, Some(int(0))),
        declare(&c, Some(boolean(true))),
        while_loop(
            0,
            ident(&c),
            block(vec![expr(assign(
                ident(&x),
                binary(BinaryOp::Add, ident(&x), int(1)),
            ))]),
        ),
    ]);
    let module = assert_compiles(&prog);
    let func = lowered(&module, "main");
    let (_, liveness) = analyze(func);

    let x_slot = Register::Virtual(slots(func)[0]);
    for label in ["condition.0", "body.0"] {
        assert!(liveness.live_in(label).unwrap().contains(&x_slot), "{}", label);
        assert!(liveness.live_out(label).unwrap().contains(&x_slot), "{}", label);
    }
    assert!(liveness.live_in("end.0").unwrap().is_empty());
    assert!(liveness.live_out("end.0").unwrap().is_empty());
}

#[test]
fn test_loop_free_entry_live_in_is_the_arguments() {
    let a = param(0, "a", Type::Int);
    let b = param(1, "b", Type::Int);
    let f = function(
        "main",
        vec![a.clone(), b.clone()],
        Type::Int,
        vec![ret(Some(binary(BinaryOp::Add, ident(&a), ident(&b))))],
    );
    let module = assert_compiles(&program(vec![f]));
    let func = lowered(&module, "main");
    let (_, liveness) = analyze(func);

    assert_eq!(
        liveness.live_in("entry"),
        Some(&regs(&[Register::Argument(0), Register::Argument(1)]))
    );
    assert!(liveness.live_out("entry").unwrap().is_empty());
}

#[test]
fn test_ternary_phi_becomes_coalescing_candidates() {
    let a = param(0, "a", Type::Int);
    let c = param(1, "c", Type::Bool);
    let f = function(
        "main",
        vec![a.clone(), c.clone()],
        Type::Int,
        vec![ret(Some(ternary(
            ident(&c),
            ident(&a),
            binary(BinaryOp::Mul, ident(&a), int(3)),
        )))],
    );
    let module = assert_compiles(&program(vec![f]));
    let func = lowered(&module, "main");
    let (graph, liveness) = analyze(func);

    // one move per arm, in front of each arm's jump
    for label in ["then.0", "else.0"] {
        let block = graph.block(label).unwrap();
        let moves = block.instructions.iter().filter(|i| i.is_move()).count();
        assert_eq!(moves, 1, "{}", label);
        assert!(block.instructions.last().is_some_and(|i| !i.is_move()));
    }
    assert_eq!(liveness.coalesce().len(), 2);
}

#[test]
fn test_liveness_is_stable_across_runs() {
    let i = local(0, "i", Type::Int);
    let g = global(1, "total", Type::Int);
    let mut prog = main_fn(vec![for_loop(
        0,
        Some(declare(&i, Some(int(0)))),
        Some(binary(BinaryOp::Less, ident(&i), int(10))),
        Some(suffix(SuffixOp::Inc, ident(&i))),
        expr(binary(BinaryOp::AddAssign, ident(&g), ident(&i))),
    )]);
    prog.globals.push(global_decl(&g, None));

    let module = assert_compiles(&prog);
    for func in &module.functions {
        let (graph, first) = analyze(func);
        let second = Liveness::analyze(&graph).unwrap();
        assert_eq!(first.blocks(), second.blocks());
        assert_eq!(first.interference(), second.interference());
        assert_eq!(first.coalesce(), second.coalesce());
    }
}

#[test]
fn test_global_store_assist_interferes() {
    let g = global(0, "g", Type::Int);
    let a = param(1, "a", Type::Int);
    let mut prog = program(vec![function(
        "main",
        vec![a.clone()],
        Type::Void,
        vec![expr(assign(ident(&g), ident(&a)))],
    )]);
    prog.globals.push(global_decl(&g, None));

    let module = assert_compiles(&prog);
    let func = lowered(&module, "main");
    let (graph, liveness) = analyze(func);

    let store = graph.blocks()[0]
        .instructions
        .iter()
        .find_map(|i| match i.kind {
            tern_liveness::FlowKind::StoreAssist { value, assist } => Some((value, assist)),
            _ => None,
        })
        .unwrap();
    assert!(liveness.interferes(store.0, store.1));
    assert!(store.1 >= Register::Virtual(func.temp_count()));
}

#[test]
fn test_ir_dump_names_functions() {
    let f = function("helper", vec![], Type::Void, vec![]);
    let main = function(
        "main",
        vec![],
        Type::Int,
        vec![expr(call(FunctionRef::top("helper"), vec![], Type::Void))],
    );
    let prog = program(vec![main, f]);
    assert_ir_contains(&prog, "@__toplevel__.helper");
    let module = assert_compiles(&prog);
    assert!(module.functions.iter().all(|f| f.verify().is_ok()));
    assert_eq!(
        module.get_function("main").map(|f| f.blocks[0].terminator().cloned()),
        Some(Some(Instruction::Return {
            ty: tern_ir::IrType::I32,
            value: Value::Const(0),
        }))
    );
}
