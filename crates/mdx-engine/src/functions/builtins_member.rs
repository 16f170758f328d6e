//! Member and hierarchy navigation properties: `.CurrentMember`, `.Children`,
//! `.Members`.

use super::{BuiltinDef, FunctionMetaData, FunctionTable, OperationAtom, SimpleResolver};
use crate::calc::Calc;
use crate::compiler::Compiler;
use crate::error::{EngineError, EngineResult};
use crate::types::DataType;

pub(super) fn register(table: &mut FunctionTable) {
    let current = OperationAtom::property("CurrentMember");
    table.register(Box::new(SimpleResolver::new(
        current.clone(),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom: current,
                description: "Current member of a hierarchy in the evaluation context.",
                returns: DataType::Member,
                parameters: vec![DataType::Hierarchy],
            },
            compile_current_member,
        )],
    )));

    let children = OperationAtom::property("Children");
    table.register(Box::new(SimpleResolver::new(
        children.clone(),
        vec![BuiltinDef::new(
            FunctionMetaData {
                atom: children,
                description: "Child members of a member, in catalog order.",
                returns: DataType::Set,
                parameters: vec![DataType::Member],
            },
            compile_children,
        )],
    )));

    let members = OperationAtom::property("Members");
    table.register(Box::new(SimpleResolver::new(
        members.clone(),
        vec![
            BuiltinDef::new(
                FunctionMetaData {
                    atom: members.clone(),
                    description: "All members of a level, in catalog order.",
                    returns: DataType::Set,
                    parameters: vec![DataType::Level],
                },
                compile_level_members,
            ),
            BuiltinDef::new(
                FunctionMetaData {
                    atom: members,
                    description: "All members of a hierarchy, level by level.",
                    returns: DataType::Set,
                    parameters: vec![DataType::Hierarchy],
                },
                compile_hierarchy_members,
            ),
        ],
    )));
}

fn one(mut args: Vec<Calc>, function: &str) -> EngineResult<Calc> {
    if args.len() != 1 {
        return Err(EngineError::Type(format!(
            "{function} expects 1 argument, got {}",
            args.len()
        )));
    }
    args.pop()
        .ok_or_else(|| EngineError::Type(format!("{function} expects 1 argument")))
}

fn compile_current_member(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    match one(args, "CurrentMember")? {
        Calc::HierarchyRef { hierarchy } => Ok(Calc::CurrentMember { hierarchy }),
        other => Err(EngineError::InvalidArgument {
            function: "CurrentMember".to_string(),
            position: 1,
            expected: DataType::Hierarchy,
            actual: other.data_type(),
        }),
    }
}

fn compile_children(args: Vec<Calc>, compiler: &mut Compiler<'_>) -> EngineResult<Calc> {
    let member = one(args, "Children")?;
    let hierarchy = compiler.member_hierarchy(&member).ok_or_else(|| {
        EngineError::InvalidArgument {
            function: "Children".to_string(),
            position: 1,
            expected: DataType::Member,
            actual: member.data_type(),
        }
    })?;
    Ok(Calc::Children {
        member: Box::new(member),
        hierarchy,
    })
}

fn compile_level_members(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    match one(args, "Members")? {
        Calc::LevelRef { hierarchy, depth } => Ok(Calc::LevelMembers { hierarchy, depth }),
        other => Err(EngineError::InvalidArgument {
            function: "Members".to_string(),
            position: 1,
            expected: DataType::Level,
            actual: other.data_type(),
        }),
    }
}

fn compile_hierarchy_members(args: Vec<Calc>, _: &mut Compiler<'_>) -> EngineResult<Calc> {
    match one(args, "Members")? {
        Calc::HierarchyRef { hierarchy } => Ok(Calc::HierarchyMembers { hierarchy }),
        other => Err(EngineError::InvalidArgument {
            function: "Members".to_string(),
            position: 1,
            expected: DataType::Hierarchy,
            actual: other.data_type(),
        }),
    }
}
