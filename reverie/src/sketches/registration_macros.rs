/// Builds a [`Builtins`](crate::registry::Builtins) table from program
/// modules that expose `PROGRAM_CONFIG` and `init()`.
///
/// ```ignore
/// let builtins = reverie::register_programs! {
///     { title: "Demos", programs: [pulse, lameduck] },
/// }?;
/// ```
#[macro_export]
macro_rules! register_programs {
    (
        $(
            {
                title: $title:expr,
                programs: [$($module:ident),* $(,)?]
            }
        ),+ $(,)?
    ) => {{
        (|| -> Result<$crate::registry::Builtins, String> {
            let mut __builtins = $crate::registry::Builtins::new();

            $(
                let mut __category_programs = Vec::new();
                $(
                    __builtins.register(
                        &$module::PROGRAM_CONFIG,
                        || Box::new($module::init()),
                    )?;
                    __category_programs
                        .push($module::PROGRAM_CONFIG.name.to_string());
                )*

                __builtins.define_category($title, __category_programs)?;
            )+

            Ok(__builtins)
        })()
    }};
}
