//! String templates.
//!
//! ```text
//! "a${x}b"    New StringBuilder; Dup; CallSpecial <init>
//!             Constant "a"; CallVirtual append(String)
//!             <x>;          CallVirtual append(Int)
//!             Constant "b"; CallVirtual append(String)
//!             CallVirtual toString
//! ```
//!
//! Templates of text only fold to one constant. A lone `${x}` skips the
//! builder and is converted by the runtime's `stringOf`.

use tessera_core::{MachineType, PrimitiveKind, Result, TypeHash, well_known};
use tessera_tree::{BinaryOp, Expr, Literal, StringTemplateExpr, TemplateEntry};

use super::ExprCompiler;
use super::calls::argc;
use crate::bytecode::{MemberRef, OpCode};
use crate::value::LazyValue;

/// Parameter type of the `append` overload taking `ty`.
fn append_type(ty: MachineType) -> MachineType {
    match ty {
        MachineType::Primitive(PrimitiveKind::Byte | PrimitiveKind::Short) => MachineType::INT,
        MachineType::Primitive(_) => ty,
        _ if ty == MachineType::STRING => ty,
        _ => MachineType::ANY,
    }
}

fn builder_method(name: &str, params: &[MachineType]) -> MemberRef {
    let hashes: Vec<TypeHash> = params.iter().map(|p| p.type_hash()).collect();
    let hash = if name == "<init>" {
        TypeHash::from_constructor(well_known::STRING_BUILDER, &hashes)
    } else {
        TypeHash::from_method(well_known::STRING_BUILDER, name, &hashes)
    };
    MemberRef::new(well_known::STRING_BUILDER, name, hash)
}

/// Concatenated text of a template without expressions.
fn constant_text(entries: &[TemplateEntry<'_>]) -> Option<String> {
    let mut text = String::new();
    for entry in entries {
        match entry {
            TemplateEntry::Text(piece) => text.push_str(piece),
            TemplateEntry::Expression(_) => return None,
        }
    }
    Some(text)
}

/// Compile a string template.
pub fn compile_template<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    template: &'ast StringTemplateExpr<'ast>,
) -> Result<LazyValue<'ast>> {
    if let [TemplateEntry::Expression(expr)] = template.entries {
        return compile_string_of(compiler, *expr);
    }
    if let Some(text) = constant_text(template.entries) {
        return Ok(LazyValue::constant(Literal::string(&text), MachineType::STRING));
    }

    compiler
        .sink
        .emit_type_op(OpCode::New, well_known::STRING_BUILDER);
    compiler.sink.emit(OpCode::Dup);
    compiler
        .sink
        .emit_call(OpCode::CallSpecial, builder_method("<init>", &[]), 0);
    for entry in template.entries {
        match entry {
            TemplateEntry::Text("") => {}
            TemplateEntry::Text(text) => {
                let piece = LazyValue::constant(Literal::string(text), MachineType::STRING);
                compiler.put(&piece, MachineType::STRING)?;
                emit_append(compiler, MachineType::STRING)?;
            }
            TemplateEntry::Expression(expr) => append_expression(compiler, *expr)?,
        }
    }
    compiler
        .sink
        .emit_call(OpCode::CallVirtual, builder_method("toString", &[]), 0);
    Ok(LazyValue::OnStack(MachineType::STRING))
}

fn emit_append(compiler: &mut ExprCompiler<'_, '_>, ty: MachineType) -> Result<()> {
    compiler
        .sink
        .emit_call(OpCode::CallVirtual, builder_method("append", &[ty]), argc(1)?);
    Ok(())
}

/// Append `expr`, flattening string concatenations into separate appends.
fn append_expression<'ast>(compiler: &mut ExprCompiler<'_, 'ast>, expr: Expr<'ast>) -> Result<()> {
    if let Expr::Binary(binary) = expr
        && binary.op == BinaryOp::Add
        && compiler.bindings().constant(binary.id).is_none()
        && compiler.type_of(binary.left)? == MachineType::STRING
    {
        append_expression(compiler, binary.left)?;
        return append_expression(compiler, binary.right);
    }
    let ty = append_type(compiler.type_of(expr)?);
    compiler.compile_into(expr, ty)?;
    emit_append(compiler, ty)
}

/// `"$x"`: the value itself for strings, else its runtime string form.
fn compile_string_of<'ast>(
    compiler: &mut ExprCompiler<'_, 'ast>,
    expr: Expr<'ast>,
) -> Result<LazyValue<'ast>> {
    let ty = compiler.type_of(expr)?;
    if ty == MachineType::STRING {
        return compiler.compile_value(expr);
    }
    let param = append_type(ty);
    compiler.compile_into(expr, param)?;
    let name = "stringOf";
    let method = MemberRef::new(
        well_known::RUNTIME,
        name,
        TypeHash::from_method(well_known::RUNTIME, name, &[param.type_hash()]),
    );
    compiler.sink.emit_call(OpCode::CallStatic, method, argc(1)?);
    Ok(LazyValue::OnStack(MachineType::STRING))
}

#[cfg(test)]
mod tests {
    use bumpalo::Bump;
    use tessera_core::MachineType;
    use tessera_tree::{BinaryOp, TemplateEntry, TreeBuilder};

    use crate::bytecode::{BytecodeChunk, Constant, OpCode};
    use crate::test_utils::compile_body;

    /// Names of the methods called by `chunk`, in order.
    fn called(chunk: &BytecodeChunk) -> Vec<String> {
        chunk
            .instruction_offsets()
            .into_iter()
            .filter_map(|at| match chunk.constant_operand(at) {
                Some(Constant::Method(method)) => Some(method.name.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn text_only_templates_fold_to_one_constant() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[], MachineType::STRING);
        let hello = b.text("hello, ");
        let world = b.text("world");
        let template = b.template(&[hello, world]);
        let body = b.ret(Some(template));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[OpCode::Constant, OpCode::Return]);
        assert_eq!(
            compiled.chunk.constant_operand(0),
            Some(&Constant::String("hello, world".into()))
        );
    }

    #[test]
    fn mixed_templates_append_each_piece() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("n", MachineType::INT)], MachineType::STRING);
        let n = b.params(f)[0];
        let prefix = b.text("n = ");
        let read = b.name(n);
        let suffix = b.text("!");
        let template = b.template(&[prefix, TemplateEntry::Expression(read), suffix]);
        let body = b.ret(Some(template));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled.chunk.assert_opcodes(&[
            OpCode::New,
            OpCode::Dup,
            OpCode::CallSpecial,
            OpCode::Constant,
            OpCode::CallVirtual,
            OpCode::GetLocal,
            OpCode::CallVirtual,
            OpCode::Constant,
            OpCode::CallVirtual,
            OpCode::CallVirtual,
            OpCode::Return,
        ]);
        assert_eq!(
            called(&compiled.chunk),
            ["<init>", "append", "append", "append", "toString"]
        );
    }

    #[test]
    fn string_concatenation_inside_a_template_is_flattened() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function(
            "f",
            &[("a", MachineType::STRING), ("n", MachineType::INT)],
            MachineType::STRING,
        );
        let params = b.params(f);
        let a = b.name(params[0]);
        let n = b.name(params[1]);
        let joined = b.binary(BinaryOp::Add, a, n, MachineType::STRING);
        let lead = b.text("<");
        let template = b.template(&[lead, TemplateEntry::Expression(joined)]);
        let body = b.ret(Some(template));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        assert_eq!(compiled.chunk.count_opcode(OpCode::CallStatic), 0);
        assert_eq!(
            called(&compiled.chunk),
            ["<init>", "append", "append", "append", "toString"]
        );
    }

    #[test]
    fn a_lone_expression_skips_the_builder() {
        let arena = Bump::new();
        let mut b = TreeBuilder::new(&arena);
        let f = b.function("f", &[("n", MachineType::LONG)], MachineType::STRING);
        let n = b.params(f)[0];
        let read = b.name(n);
        let template = b.template(&[TemplateEntry::Expression(read)]);
        let body = b.ret(Some(template));
        let bindings = b.finish();

        let compiled = compile_body(&bindings, f, body).unwrap();
        compiled
            .chunk
            .assert_opcodes(&[OpCode::GetLocal, OpCode::CallStatic, OpCode::Return]);
        assert_eq!(called(&compiled.chunk), ["stringOf"]);
    }
}
